//! The face match gate.
//!
//! The biometric capability itself is external: anything that can turn an
//! image into encodings and measure a distance between two encodings
//! satisfies [`FaceMatcher`], and the chosen backend is handed to Rocket as
//! managed state. This module owns everything around that contract: transport
//! decoding of the captured photo, the first-face policy, the bounded-time
//! extraction run, and the final match/no-match decision.
//!
//! The gate fails closed. Malformed input, a face-less image, a backend
//! failure or a timeout all mean "no match" and therefore no attendance row.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rocket::tokio::task;
use rocket::tokio::time::timeout;

/// Two encodings match when their distance does not exceed this tolerance.
/// Inherited from the deployed system; smaller distance means more similar.
pub const MATCH_TOLERANCE: f64 = 0.6;

/// Wall-clock budget for extracting both encodings. Extraction is CPU-bound
/// and must not hold a request open indefinitely; exceeding the budget is a
/// failed extraction, not a retry.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// An ephemeral feature vector derived from one face image. Never persisted;
/// dropped as soon as the distance is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEncoding(Vec<f64>);

impl FaceEncoding {
    pub fn new(values: Vec<f64>) -> Self {
        FaceEncoding(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Why a backend could not produce an encoding for an image.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    NoFaceDetected,
    Backend(String),
}

/// The consumed biometric capability: detect-and-encode plus a distance
/// metric. Implementations must be cheap to share across requests.
pub trait FaceMatcher: Send + Sync {
    /// Returns one encoding per detected face, in the backend's detection
    /// order. An image with no detectable face is an error, not an empty
    /// list.
    fn encodings(&self, image: &[u8]) -> Result<Vec<FaceEncoding>, ExtractError>;

    /// Distance between two encodings. Must be non-negative and symmetric.
    fn distance(&self, a: &FaceEncoding, b: &FaceEncoding) -> f64;
}

/// Outcome of a completed comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchVerdict {
    pub is_match: bool,
    pub distance: f64,
}

/// Why a comparison never reached a verdict.
///
/// The reference and probe sides are kept apart on purpose: an unreadable
/// reference is an administrative data problem, an unreadable probe is
/// something the student can fix by recapturing.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareError {
    ReferenceUnreadable(ExtractError),
    ProbeUnreadable(ExtractError),
    Timeout,
    Backend(String),
}

/// Why a captured image could not be decoded from its transport form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDecodeError {
    /// A `data:` URI without the `,` separating header from payload.
    MissingPayload,
    /// Nothing left after stripping the header.
    Empty,
    /// The payload is not valid base64.
    BadBase64,
}

/// Decodes a captured photo from its transport encoding.
///
/// Browsers submit canvas captures as `data:image/jpeg;base64,<payload>`
/// URIs; bare base64 is also accepted. Anything malformed is an error -
/// never a best-effort decode.
pub fn decode_captured_image(data: &str) -> Result<Vec<u8>, ImageDecodeError> {
    let payload = if data.starts_with("data:") {
        match data.split_once(',') {
            Some((_header, body)) => body,
            None => return Err(ImageDecodeError::MissingPayload),
        }
    } else {
        data
    };

    if payload.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    STANDARD
        .decode(payload)
        .map_err(|_| ImageDecodeError::BadBase64)
}

/// Picks the encoding the gate will use for an image.
///
/// When the backend detects more than one face the first detection wins and
/// a warning is logged. Ambiguous, but deliberately not rejected; the
/// deployed system behaves this way and tightening it needs product sign-off.
fn first_encoding(
    matcher: &dyn FaceMatcher,
    image: &[u8],
) -> Result<FaceEncoding, ExtractError> {
    let mut encodings = matcher.encodings(image)?;
    if encodings.is_empty() {
        return Err(ExtractError::NoFaceDetected);
    }
    if encodings.len() > 1 {
        warn!(
            "Found {} faces in the image. Using the first one.",
            encodings.len()
        );
    }
    Ok(encodings.remove(0))
}

/// Compares a stored reference image against a freshly captured probe.
///
/// Both extractions run on a blocking thread under `budget`; blowing the
/// budget is a [`CompareError::Timeout`] and the caller writes nothing. On
/// completion the verdict is `distance <= tolerance`. The distance inherits
/// the backend's symmetry, so comparing (reference, probe) and
/// (probe, reference) agree.
pub async fn compare_faces(
    matcher: Arc<dyn FaceMatcher>,
    reference: Vec<u8>,
    probe: Vec<u8>,
    tolerance: f64,
    budget: Duration,
) -> Result<MatchVerdict, CompareError> {
    let work = task::spawn_blocking(move || {
        let reference_encoding = first_encoding(matcher.as_ref(), &reference)
            .map_err(CompareError::ReferenceUnreadable)?;
        let probe_encoding = first_encoding(matcher.as_ref(), &probe)
            .map_err(CompareError::ProbeUnreadable)?;
        // Encodings are dropped at the end of this closure; nothing biometric
        // outlives the comparison.
        let distance = matcher.distance(&reference_encoding, &probe_encoding);
        info!("Face distance: {}", distance);
        Ok(MatchVerdict {
            is_match: distance <= tolerance,
            distance,
        })
    });

    match timeout(budget, work).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(join_error)) => Err(CompareError::Backend(join_error.to_string())),
        Err(_elapsed) => Err(CompareError::Timeout),
    }
}

/// Built-in backend so the server runs without an external model.
///
/// Encodes the whole image as a single detection: a normalized 64-bin
/// histogram of its bytes, compared by halved L1 distance (0.0 identical,
/// 1.0 disjoint). Deployments substitute a real face-recognition backend via
/// [`crate::rocket_with_matcher`]; validation and recording never notice.
pub struct HistogramMatcher;

impl FaceMatcher for HistogramMatcher {
    fn encodings(&self, image: &[u8]) -> Result<Vec<FaceEncoding>, ExtractError> {
        if image.is_empty() {
            return Err(ExtractError::NoFaceDetected);
        }
        let mut bins = vec![0f64; 64];
        for &byte in image {
            bins[(byte >> 2) as usize] += 1.0;
        }
        let total = image.len() as f64;
        for bin in &mut bins {
            *bin /= total;
        }
        Ok(vec![FaceEncoding(bins)])
    }

    fn distance(&self, a: &FaceEncoding, b: &FaceEncoding) -> f64 {
        a.0.iter()
            .zip(&b.0)
            .map(|(x, y)| (x - y).abs())
            .sum::<f64>()
            / 2.0
    }
}

/// Scripted backend for tests.
///
/// The image bytes themselves drive the behavior:
/// - empty or `noface...` payloads have no detectable face;
/// - `brokenbackend...` fails extraction outright;
/// - `slowface:<rest>` sleeps long enough to trip a small timeout budget,
///   then encodes `<rest>`;
/// - `twofaces:<rest>` reports two identical detections of `<rest>`;
/// - anything else encodes to its own bytes.
///
/// Distance is the fraction of positions (padded to the longer encoding)
/// whose values differ, so fixtures can dial in exact distances.
#[cfg(any(test, feature = "test-staging"))]
#[derive(Default)]
pub struct StubMatcher;

#[cfg(any(test, feature = "test-staging"))]
impl StubMatcher {
    fn encode(payload: &[u8]) -> FaceEncoding {
        FaceEncoding(payload.iter().map(|&b| b as f64).collect())
    }
}

#[cfg(any(test, feature = "test-staging"))]
impl FaceMatcher for StubMatcher {
    fn encodings(&self, image: &[u8]) -> Result<Vec<FaceEncoding>, ExtractError> {
        if image.is_empty() || image.starts_with(b"noface") {
            return Err(ExtractError::NoFaceDetected);
        }
        if image.starts_with(b"brokenbackend") {
            return Err(ExtractError::Backend("scripted backend failure".to_string()));
        }
        if let Some(rest) = image.strip_prefix(b"slowface:".as_slice()) {
            std::thread::sleep(Duration::from_millis(200));
            return Ok(vec![Self::encode(rest)]);
        }
        if let Some(rest) = image.strip_prefix(b"twofaces:".as_slice()) {
            return Ok(vec![Self::encode(rest), Self::encode(rest)]);
        }
        Ok(vec![Self::encode(image)])
    }

    fn distance(&self, a: &FaceEncoding, b: &FaceEncoding) -> f64 {
        let longest = a.0.len().max(b.0.len());
        if longest == 0 {
            return 0.0;
        }
        let differing = (0..longest)
            .filter(|&i| a.0.get(i) != b.0.get(i))
            .count();
        differing as f64 / longest as f64
    }
}
