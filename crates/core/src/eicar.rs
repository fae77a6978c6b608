use std::sync::LazyLock;

// Encoded so this file is not itself flagged by scanners.
const EICAR_BASE64: &str = "WDVPIVAlQEFQWzRcUFpYNTQoUF4pN0NDKTd9JEVJQ0FSLVNUQU5E\
                            QVJELUFOVElWSVJVUy1URVNULUZJTEUhJEgrSCo=";

static EICAR: LazyLock<Vec<u8>> = LazyLock::new(|| {
    data_encoding::BASE64
        .decode(EICAR_BASE64.as_bytes())
        .expect("EICAR constant should be valid base64")
});

/// The standard EICAR antivirus test file contents.
#[must_use]
pub fn eicar() -> &'static [u8] {
    &EICAR
}
