//! Gate for files dropped onto a slot.

/// A file offered by the UI for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// Media type reported by the picker; may be empty.
    pub media_type: String,
}

const ACCEPTED_MEDIA_TYPES: [&str; 2] = ["audio/mpeg", "audio/wav"];
const ACCEPTED_EXTENSIONS: [&str; 2] = [".mp3", ".wav"];

/// Accepts MP3 and WAV files, by media type or by file extension.
pub fn is_valid_upload(name: &str, media_type: &str) -> bool {
    if ACCEPTED_MEDIA_TYPES
        .iter()
        .any(|accepted| media_type.contains(accepted))
    {
        return true;
    }

    let name = name.to_ascii_lowercase();
    ACCEPTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
