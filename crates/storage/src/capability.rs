//! The `x-obex/capability` document served to peers that ask for it.

/// Generates the capability document describing this server.
///
/// The Folder-Browsing service is listed only when `folder_browsing` is set,
/// that is when File Transfer is offered. The inbox accepts any type.
pub fn capability_document(folder_browsing: bool) -> Vec<u8> {
    let services = if folder_browsing {
        format!(
            "\x20 <Service>\n\
             \x20   <Name>Folder-Browsing</Name>\n\
             \x20   <UUID>{}</UUID>\n\
             \x20 </Service>\n",
            obexbox_protocol::FTP_TARGET.to_string().to_uppercase()
        )
    } else {
        String::new()
    };
    format!(
        "<?xml version=\"1.0\"?>\n\
         <!DOCTYPE Capability SYSTEM \"obex-capability.dtd\">\n\
         <Capability Version=\"1.0\">\n\
         \x20 <General>\n\
         \x20   <Manufacturer>obexbox</Manufacturer>\n\
         \x20   <Model>obexbox</Model>\n\
         \x20   <SW Version=\"{version}\"/>\n\
         \x20 </General>\n\
         {services}\
         \x20 <Inbox>\n\
         \x20   <Object><Type>*</Type></Object>\n\
         \x20 </Inbox>\n\
         </Capability>\n",
        version = env!("CARGO_PKG_VERSION"),
    )
    .into_bytes()
}
