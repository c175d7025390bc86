//! QR code artifact for the login handshake.
//!
//! The QR image is fetched from the login host and written to disk, named by
//! the login identifier. The scan URL can also be rendered in a terminal.

use std::fs;
use std::path::{Path, PathBuf};

use qrcode::{render::unicode, QrCode};

use crate::error::{Error, Result};

/// A login QR code issued for one login identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrTicket {
    /// Opaque login identifier.
    pub uuid: String,
    /// URL the QR image was downloaded from.
    pub image_url: String,
    /// Content encoded in the QR code; what the phone actually scans.
    pub scan_url: String,
    /// Where the image was written.
    pub path: PathBuf,
}

impl QrTicket {
    pub fn new(login_host: &str, uuid: &str, millis: i64, dir: &Path) -> Self {
        Self {
            uuid: uuid.to_string(),
            image_url: format!("https://{login_host}/qrcode/{uuid}?t=webwx&_={millis}"),
            scan_url: format!("https://{login_host}/l/{uuid}"),
            path: dir.join(format!("{}.jpg", sanitize(uuid))),
        }
    }

    /// Write the downloaded image, creating the directory if needed.
    pub fn persist(&self, image: &[u8]) -> Result<()> {
        if image.is_empty() {
            return Err(Error::protocol("qrcode", "empty image"));
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, image)?;
        Ok(())
    }

    /// Remove the image. Missing files are not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Render the scan URL for terminal display.
    pub fn render_ascii(&self) -> Result<String> {
        render_qr_ascii(&self.scan_url)
    }
}

/// Login identifiers may contain `/`; keep the file inside the QR directory.
fn sanitize(uuid: &str) -> String {
    uuid.replace(['/', '\\'], "_")
}

/// Render QR code as ASCII for terminal display.
pub fn render_qr_ascii(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| Error::protocol("qrcode", e.to_string()))?;

    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(image)
}
