use image::GrayImage;
use thiserror::Error;
use tracing::debug;

use crate::preprocess;
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::{Granularity, RecognizedWord};

/// Lines at or below this engine confidence are treated as misreads.
pub const MIN_CONFIDENCE: f32 = 30.0;
/// Lines of this many characters or fewer are fragments, not an encoding line.
pub const MIN_TEXT_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No candidate encoding line found in upright or flipped image")]
    NoCandidateLineFound,
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Order words widest first; among equal widths, lowest on the page first.
///
/// This is an ascending sort on `(width, y)` followed by a reversal of the
/// whole sequence, so the composite tie-break is kept.
pub fn sort_words(words: &mut [RecognizedWord]) {
    words.sort_by_key(|w| (w.bounding_box.width, w.bounding_box.y));
    words.reverse();
}

/// First word in `words` confident and long enough to be the encoding line.
pub fn select_candidate(words: &[RecognizedWord]) -> Option<&RecognizedWord> {
    words
        .iter()
        .find(|w| w.confidence > MIN_CONFIDENCE && w.text.chars().count() > MIN_TEXT_LEN)
}

/// Pick the encoding line out of a normalized check image.
///
/// A second pass on the image turned 180° runs only when the upright pass
/// finds nothing usable.
pub fn extract_encoding_line<R>(image: &GrayImage, ocr: &mut R) -> Result<String, ExtractionError>
where
    R: OcrBackend + ?Sized,
{
    if let Some(text) = best_line(image, ocr)? {
        return Ok(text);
    }
    debug!("no usable line upright, retrying on flipped image");
    best_line(&preprocess::flip(image), ocr)?.ok_or(ExtractionError::NoCandidateLineFound)
}

fn best_line<R>(image: &GrayImage, ocr: &mut R) -> Result<Option<String>, OcrError>
where
    R: OcrBackend + ?Sized,
{
    let mut words = ocr.recognize_words(image, Granularity::Line)?;
    sort_words(&mut words);
    let candidate = select_candidate(&words);
    debug!(
        lines = words.len(),
        selected = candidate.map(|w| w.text.as_str()),
        "ranked recognized lines"
    );
    Ok(candidate.map(|w| w.text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, ScriptedRecognizer};
    use crate::types::BoundingBox;
    use image::Luma;

    fn word(text: &str, confidence: f32, y: u32, width: u32) -> RecognizedWord {
        RecognizedWord::new(text, confidence, BoundingBox::new(0, y, width, 20))
    }

    fn page() -> GrayImage {
        let mut img = GrayImage::from_pixel(8, 4, Luma([255]));
        img.put_pixel(0, 0, Luma([0]));
        img
    }

    #[test]
    fn sort_puts_widest_first_and_lower_line_first_on_ties() {
        let mut words = vec![
            word("narrow", 90.0, 500, 100),
            word("wide-top", 90.0, 10, 800),
            word("wide-bottom", 90.0, 600, 800),
            word("middle", 90.0, 300, 400),
        ];
        sort_words(&mut words);
        let order: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(order, ["wide-bottom", "wide-top", "middle", "narrow"]);
    }

    #[test]
    fn sort_is_deterministic() {
        let original = vec![
            word("a", 10.0, 5, 50),
            word("b", 20.0, 5, 50),
            word("c", 30.0, 1, 70),
            word("d", 40.0, 9, 10),
        ];
        let mut first = original.clone();
        sort_words(&mut first);
        for _ in 0..5 {
            let mut again = original.clone();
            sort_words(&mut again);
            assert_eq!(again, first);
        }
        // Exact duplicates on both keys come out in reverse input order.
        let order: Vec<_> = first.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(order, ["c", "b", "a", "d"]);
    }

    #[test]
    fn confidence_of_exactly_thirty_is_rejected() {
        let words = [word("A021000021A123", 30.0, 0, 900)];
        assert!(select_candidate(&words).is_none());
        let words = [word("A021000021A123", 30.5, 0, 900)];
        assert!(select_candidate(&words).is_some());
    }

    #[test]
    fn text_of_exactly_ten_chars_is_rejected() {
        let words = [word("0123456789", 99.0, 0, 900)];
        assert!(select_candidate(&words).is_none());
        let words = [word("0123456789A", 99.0, 0, 900)];
        assert!(select_candidate(&words).is_some());
    }

    #[test]
    fn selection_follows_sorted_order() {
        let words = [
            word("short", 99.0, 0, 1000),
            word("A021000021A1234567890", 80.0, 0, 900),
            word("A111111111A1111111111", 95.0, 0, 300),
        ];
        assert_eq!(select_candidate(&words).unwrap().text, "A021000021A1234567890");
    }

    #[test]
    fn upright_hit_skips_the_retry() {
        let mut ocr = MockRecognizer::new(vec![
            word("PAY TO THE ORDER OF", 85.0, 100, 600),
            word("C1001CA021000021A1234567890", 75.0, 400, 900),
        ]);
        let text = extract_encoding_line(&page(), &mut ocr).unwrap();
        assert_eq!(text, "C1001CA021000021A1234567890");
        assert_eq!(ocr.calls, 1);
    }

    #[test]
    fn retries_on_flipped_image() {
        let mut ocr = ScriptedRecognizer::new([
            Ok(vec![word("V6LLTCLLIO", 90.0, 0, 900), word("A0210000210A1", 12.0, 10, 900)]),
            Ok(vec![word("A021000021A1234567890", 88.0, 0, 900)]),
        ]);
        let image = page();
        let text = extract_encoding_line(&image, &mut ocr).unwrap();

        assert_eq!(text, "A021000021A1234567890");
        assert_eq!(ocr.calls(), 2);
        assert_eq!(ocr.seen[0], image);
        assert_eq!(ocr.seen[1], preprocess::flip(&image));
    }

    #[test]
    fn fails_after_both_passes_come_up_empty() {
        let mut ocr = MockRecognizer::new(vec![word("too short", 99.0, 0, 900)]);
        let err = extract_encoding_line(&page(), &mut ocr).unwrap_err();
        assert!(matches!(err, ExtractionError::NoCandidateLineFound));
        assert_eq!(ocr.calls, 2);
    }

    #[test]
    fn engine_failure_propagates_without_retry() {
        let mut ocr = ScriptedRecognizer::new([Err(OcrError::Engine("not ready".into()))]);
        let err = extract_encoding_line(&page(), &mut ocr).unwrap_err();
        assert!(matches!(err, ExtractionError::Ocr(OcrError::Engine(_))));
        assert_eq!(ocr.calls(), 1);
    }
}
