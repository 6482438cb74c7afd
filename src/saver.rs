//! Saves activation and command audio as indexed WAV files, continuing the
//! numbering from whatever is already in the target directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

const FILE_PREFIX: &str = "activation-";
const FILE_SUFFIX: &str = ".wav";

#[derive(Debug)]
pub enum SaveError {
    Io(String),
    Encode(String),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(msg) => write!(f, "save I/O failed: {msg}"),
            SaveError::Encode(msg) => write!(f, "WAV encoding failed: {msg}"),
        }
    }
}

/// Writes 16-bit mono PCM WAV files named `activation-NNNN.wav` with a
/// monotonically increasing index.
pub struct ActivationSaver {
    dir: PathBuf,
    next_index: u32,
    sample_rate: u32,
}

impl ActivationSaver {
    /// Create the target directory if needed and resume numbering after the
    /// greatest index already present.
    pub fn new(dir: impl Into<PathBuf>, sample_rate: u32) -> Result<Self, SaveError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SaveError::Io(e.to_string()))?;
        let next_index = greatest_index(&dir)?.map_or(0, |greatest| greatest + 1);
        Ok(Self {
            dir,
            next_index,
            sample_rate,
        })
    }

    /// Write one clip and return its path.
    pub fn save(&mut self, samples: &[i16]) -> Result<PathBuf, SaveError> {
        let path = self
            .dir
            .join(format!("{FILE_PREFIX}{:04}{FILE_SUFFIX}", self.next_index));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer =
            hound::WavWriter::create(&path, spec).map_err(|e| SaveError::Encode(e.to_string()))?;
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| SaveError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| SaveError::Encode(e.to_string()))?;

        info!(path = %path.display(), samples = samples.len(), "audio clip saved");
        self.next_index += 1;
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Greatest `activation-NNNN.wav` index in `dir`, or None when the
/// directory holds no matching files.
fn greatest_index(dir: &Path) -> Result<Option<u32>, SaveError> {
    let mut greatest = None;
    let entries = fs::read_dir(dir).map_err(|e| SaveError::Io(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| SaveError::Io(e.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(index) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            .and_then(|digits| digits.parse::<u32>().ok())
        else {
            continue;
        };
        greatest = Some(greatest.map_or(index, |g: u32| g.max(index)));
    }
    Ok(greatest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_start_at_zero_and_increment() {
        let tmp = tempfile::tempdir().unwrap();
        let mut saver = ActivationSaver::new(tmp.path(), 16000).unwrap();
        let a = saver.save(&[0i16; 128]).unwrap();
        let b = saver.save(&[100i16; 128]).unwrap();
        assert!(a.ends_with("activation-0000.wav"));
        assert!(b.ends_with("activation-0001.wav"));
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn test_numbering_resumes_after_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut saver = ActivationSaver::new(tmp.path(), 16000).unwrap();
            saver.save(&[1i16; 16]).unwrap();
            saver.save(&[2i16; 16]).unwrap();
        }
        let mut fresh = ActivationSaver::new(tmp.path(), 16000).unwrap();
        let path = fresh.save(&[3i16; 16]).unwrap();
        assert!(path.ends_with("activation-0002.wav"));
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        fs::write(tmp.path().join("activation-bad.wav"), b"x").unwrap();
        let mut saver = ActivationSaver::new(tmp.path(), 16000).unwrap();
        let path = saver.save(&[0i16; 16]).unwrap();
        assert!(path.ends_with("activation-0000.wav"));
    }

    #[test]
    fn test_wav_header_matches_format() {
        let tmp = tempfile::tempdir().unwrap();
        let mut saver = ActivationSaver::new(tmp.path(), 16000).unwrap();
        let samples: Vec<i16> = (0..256).map(|i| i as i16 * 64).collect();
        let path = saver.save(&samples).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 256);
    }
}
