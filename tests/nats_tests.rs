use base64::Engine;
use voice_pipeline::nats::messages::{AudioFrameMessage, RecognizerErrorMessage, TranscriptMessage};
use voice_pipeline::recognition::{parse_error_kind, RecognizerErrorKind};

fn frame(sequence: u32, pcm: String, final_frame: bool) -> AudioFrameMessage {
    AudioFrameMessage {
        session_id: "voice-1".to_string(),
        sequence,
        pcm,
        sample_rate: 16000,
        channels: 1,
        timestamp: "2026-03-02T09:15:00Z".to_string(),
        language: "en-US".to_string(),
        final_frame,
    }
}

#[test]
fn test_audio_frame_wire_fields() {
    let msg = frame(3, base64::engine::general_purpose::STANDARD.encode([0u8; 64]), false);

    let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["session_id"], "voice-1");
    assert_eq!(json["sequence"], 3);
    assert_eq!(json["sample_rate"], 16000);
    assert_eq!(json["language"], "en-US");
    assert_eq!(json["final"], false);
    assert!(json.get("final_frame").is_none());
}

#[test]
fn test_final_marker_has_empty_pcm() {
    let json = serde_json::to_string(&frame(12, String::new(), true)).unwrap();
    assert!(json.contains("\"final\":true"));

    let parsed: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(parsed.final_frame);
    assert!(parsed.pcm.is_empty());
    assert_eq!(parsed.sequence, 12);
}

#[test]
fn test_pcm_survives_base64_transport() {
    let samples: Vec<i16> = vec![120, -340, 5600, -7800];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let msg = frame(0, base64::engine::general_purpose::STANDARD.encode(&bytes), false);

    let parsed: AudioFrameMessage = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
    let decoded = base64::engine::general_purpose::STANDARD.decode(&parsed.pcm).unwrap();
    let restored: Vec<i16> = decoded
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    assert_eq!(restored, samples);
}

#[test]
fn test_transcript_message() {
    let json = r#"{
        "session_id": "voice-1",
        "text": "turn the lights on",
        "partial": false,
        "timestamp": "2026-03-02T09:15:04Z",
        "confidence": 0.82
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "voice-1");
    assert_eq!(msg.text, "turn the lights on");
    assert!(!msg.partial);
    assert!((msg.confidence - 0.82).abs() < 1e-6);
}

#[test]
fn test_transcript_without_confidence_defaults_to_zero() {
    let json = r#"{
        "session_id": "voice-1",
        "text": "turn the",
        "partial": true,
        "timestamp": "2026-03-02T09:15:03Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert!(msg.partial);
    assert_eq!(msg.confidence, 0.0);
}

#[test]
fn test_error_message_maps_to_kind() {
    let msg: RecognizerErrorMessage =
        serde_json::from_str(r#"{"session_id": "voice-1", "error": "no-speech"}"#).unwrap();

    assert_eq!(msg.session_id, "voice-1");
    assert_eq!(parse_error_kind(&msg.error), RecognizerErrorKind::NoSpeech);
}
