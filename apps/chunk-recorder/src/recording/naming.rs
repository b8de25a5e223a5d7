use std::path::PathBuf;

/// Hands out `{prefix}-{NNN}.{ext}` paths with a strictly increasing index.
#[derive(Debug, Clone)]
pub struct OutputNaming {
    prefix: String,
    extension: String,
    next_index: u32,
}

impl OutputNaming {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
            next_index: 0,
        }
    }

    /// Index the next call to [`OutputNaming::next`] will use.
    pub fn peek(&self) -> u32 {
        self.next_index
    }

    pub fn next(&mut self) -> (u32, PathBuf) {
        let index = self.next_index;
        let location = format!("{}-{:03}.{}", self.prefix, index, self.extension);
        self.next_index += 1;
        (index, PathBuf::from(location))
    }
}
