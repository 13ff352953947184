/// Destination for copied keys.
pub trait ClipboardSink {
    fn copy(&mut self, text: String) -> Result<(), String>;
}

/// Platform clipboard, opened on first copy and held for the rest of the
/// session (on X11 the selection is lost when the handle is dropped).
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl ClipboardSink for SystemClipboard {
    fn copy(&mut self, text: String) -> Result<(), String> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().map_err(|e| e.to_string())?);
        }
        let clipboard = self
            .inner
            .as_mut()
            .ok_or_else(|| "clipboard unavailable".to_string())?;
        clipboard.set_text(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
impl ClipboardSink for Vec<String> {
    fn copy(&mut self, text: String) -> Result<(), String> {
        self.push(text);
        Ok(())
    }
}
