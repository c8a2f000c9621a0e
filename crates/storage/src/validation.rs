use crate::StorageError;

/// Validates an object name received from the wire.
///
/// Rejects:
/// - `:`, `\` and `/` anywhere in the name
/// - Control characters (including NUL and line breaks)
/// - The relative names `.` and `..`
///
/// An empty name passes; callers decide what emptiness means for them.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name == "." || name == ".." {
        return Err(StorageError::InvalidName(format!(
            "relative name not allowed: {name}"
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, ':' | '\\' | '/') || c.is_control())
    {
        return Err(StorageError::InvalidName(format!(
            "forbidden character {bad:?} in {name:?}"
        )));
    }

    Ok(())
}

/// Validates one virtual path segment.
///
/// Same rules as [`validate_name`], and the segment must be non-empty.
pub fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty() {
        return Err(StorageError::InvalidSegment("empty segment".into()));
    }
    if segment == ".." {
        return Err(StorageError::InvalidSegment(
            "parent directory traversal not allowed".into(),
        ));
    }
    validate_name(segment).map_err(|e| StorageError::InvalidSegment(e.to_string()))
}

/// Validates a MIME type of the shape `major/minor`.
///
/// The major part may hold ASCII letters, `-` and `.`; the minor part any
/// printable ASCII except space.
pub fn validate_type(mime: &str) -> Result<(), StorageError> {
    let Some((major, minor)) = mime.split_once('/') else {
        return Err(StorageError::InvalidType(format!("missing '/': {mime:?}")));
    };

    if major.is_empty()
        || !major
            .bytes()
            .all(|b| b.is_ascii_alphabetic() || b == b'-' || b == b'.')
    {
        return Err(StorageError::InvalidType(format!("bad major type: {mime:?}")));
    }

    if minor.is_empty() || !minor.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(StorageError::InvalidType(format!("bad minor type: {mime:?}")));
    }

    Ok(())
}
