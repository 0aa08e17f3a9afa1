use super::{RecognitionResult, Recognizer};
use crate::normalizer::NormalizedImage;

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Offline recognizer for tests and demos. Answers deterministically from
/// the mean brightness of the crop, so identical crops get identical labels.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubRecognizer;

impl StubRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl Recognizer for StubRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn submit(&self, image: &NormalizedImage) -> RecognitionResult {
        let pixels = image.pixels().as_rgb();
        if pixels.is_empty() {
            return RecognitionResult::failure("empty image");
        }
        let sum: u64 = pixels.iter().map(|&v| v as u64).sum();
        let mean = sum / pixels.len() as u64;
        let index = (mean as usize * ALPHABET.len() / 256).min(ALPHABET.len() - 1);
        // Mid-grey is the least certain answer.
        let confidence = 0.5 + (mean as f32 - 127.5).abs() / 255.0;
        RecognitionResult::success(ALPHABET[index] as char, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelBuffer;
    use crate::normalizer::RegionNormalizer;

    fn crop(rgb: [u8; 3]) -> NormalizedImage {
        let frame = PixelBuffer::filled(8, 8, rgb).unwrap();
        RegionNormalizer::default().normalize(&frame, None).unwrap()
    }

    #[test]
    fn dark_and_bright_crops_map_to_alphabet_ends() {
        let recognizer = StubRecognizer::new();
        assert_eq!(recognizer.submit(&crop([0, 0, 0])).label, Some('A'));
        assert_eq!(recognizer.submit(&crop([255, 255, 255])).label, Some('Z'));
    }

    #[test]
    fn answers_are_deterministic() {
        let recognizer = StubRecognizer::new();
        let image = crop([90, 120, 150]);
        assert_eq!(recognizer.submit(&image), recognizer.submit(&image));
        assert!(recognizer.submit(&image).succeeded);
    }
}
