/// An insertion-ordered systemd unit file.
#[derive(Debug, Default, Clone)]
pub struct UnitManifest {
    lines: Vec<(&'static str, String, String)>,
}

impl UnitManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        section: &'static str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.lines.push((section, key.into(), value.into()));
        self
    }

    /// Renders the unit. A section header is written whenever the section
    /// changes, with a blank line between sections.
    pub fn render(&self) -> String {
        let mut buffer = String::new();
        let mut last = None;

        for (section, key, value) in &self.lines {
            if last != Some(*section) {
                if last.is_some() {
                    buffer.push('\n');
                }
                buffer.push_str(&format!("[{section}]\n"));
                last = Some(*section);
            }
            buffer.push_str(&format!("{key}={value}\n"));
        }

        buffer
    }
}
