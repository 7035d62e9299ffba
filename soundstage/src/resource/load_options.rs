/// How channels are handled while decoding a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertToMono {
    /// Keep the channel layout of the file. Files with more than two
    /// channels are rejected.
    Original,

    /// Average all channels into one.
    ///
    /// Mono resources are spatialized by the hardware, so this is the usual
    /// choice for positional sounds.
    ForceMono,
}

/// Options for [`load_pcm_file`](super::load_pcm_file) and
/// [`FileStream::open`](super::FileStream::open).
///
/// ```no_run
/// # use soundstage::resource::{ConvertToMono, LoadOptions};
/// let options = LoadOptions::new().convert_to_mono(ConvertToMono::ForceMono);
/// ```
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub convert_to_mono: ConvertToMono,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            convert_to_mono: ConvertToMono::Original,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }
}
