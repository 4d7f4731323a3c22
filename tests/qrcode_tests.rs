use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use notification_dispatch::{
    config::ImageConfig,
    error::DispatchError,
    qrcode::QrCodeEncoder,
};

const VERIFY_URL: &str =
    "https://www.ticketing.example.com/ticket/checked?ticketId=3f1c2e58-9f0a-4a7c-8d2e-1b6a5c4d3e2f";

fn decode_qr(bytes: &[u8]) -> Result<String> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let mut prepared = rqrr::PreparedImage::prepare(gray);
    let grids = prepared.detect_grids();
    let grid = grids.first().ok_or_else(|| anyhow!("no qr grid detected"))?;
    let (_meta, content) = grid.decode()?;
    Ok(content)
}

fn data_uri_bytes(uri: &str, prefix: &str) -> Result<Vec<u8>> {
    let encoded = uri
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow!("unexpected data uri prefix"))?;
    Ok(BASE64.decode(encoded)?)
}

/// Test: display QR round-trips through a standard reader
#[test]
fn test_display_qr_round_trip() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig::default());

    let uri = encoder.encode_for_display(VERIFY_URL)?;
    let bytes = data_uri_bytes(&uri, "data:image/png;base64,")?;

    assert_eq!(decode_qr(&bytes)?, VERIFY_URL);

    Ok(())
}

/// Test: constrained-transport QR round-trips through a standard reader
/// despite lossy compression
#[test]
fn test_transport_qr_round_trip() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig::default());

    let bytes = encoder.encode_for_constrained_transport_bytes(VERIFY_URL)?;

    assert_eq!(decode_qr(&bytes)?, VERIFY_URL);

    Ok(())
}

/// Test: transport output never silently exceeds the byte ceiling
#[test]
fn test_transport_qr_respects_size_bound() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig::default());

    // Long payload near the upper end of what a QR symbol can carry.
    let long_url = format!(
        "https://www.ticketing.example.com/ticket/checked?ticketId={}",
        "a".repeat(2000)
    );

    match encoder.encode_for_constrained_transport_bytes(&long_url) {
        Ok(bytes) => {
            assert!(!bytes.is_empty());
            assert!(bytes.len() <= 200 * 1024);
        }
        Err(DispatchError::SizeExceeded { limit, .. }) => {
            assert_eq!(limit, 200 * 1024);
        }
        Err(e) => return Err(anyhow!("unexpected error: {e}")),
    }

    Ok(())
}

/// Test: the quality ladder is bounded and exhaustion is a hard error
#[test]
fn test_quality_ladder_exhaustion_fails_loudly() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig {
        max_transport_bytes: 32,
        ..ImageConfig::default()
    });

    let err = encoder
        .encode_for_constrained_transport_bytes(VERIFY_URL)
        .unwrap_err();

    match err {
        DispatchError::SizeExceeded { limit, actual } => {
            assert_eq!(limit, 32);
            assert!(actual > 32);
        }
        other => return Err(anyhow!("expected SizeExceeded, got: {other}")),
    }

    Ok(())
}

/// Test: same payload and tuning produce the same byte length across calls
#[test]
fn test_encoding_is_deterministic_for_fixed_tuning() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig::default());

    let first = encoder.encode_for_constrained_transport_bytes(VERIFY_URL)?;
    let second = encoder.encode_for_constrained_transport_bytes(VERIFY_URL)?;

    assert_eq!(first.len(), second.len());

    Ok(())
}

/// Test: a payload too large for any QR symbol is an encoding error, not a
/// size-exceeded one
#[test]
fn test_oversized_payload_is_an_encoding_error() -> Result<()> {
    let encoder = QrCodeEncoder::new(ImageConfig::default());

    let err = encoder
        .encode_for_constrained_transport_bytes(&"x".repeat(4000))
        .unwrap_err();

    assert!(matches!(err, DispatchError::Encoding(_)));

    Ok(())
}
