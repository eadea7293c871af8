use inbox_relay::content::{decode, decode_value};
use inbox_relay::error::RelayError;
use inbox_relay::types::NormalizedMessage;
use serde_json::json;

#[test]
fn test_text_variants() {
    let msg = decode("conversation", br#"{"text": "hello"}"#).unwrap();
    assert_eq!(msg, NormalizedMessage::Text { body: "hello".to_string() });

    let msg = decode("extendedTextMessage", br#"{"text": "link https://x.y", "matchedText": "https://x.y"}"#).unwrap();
    assert_eq!(msg.kind(), "text");
}

#[test]
fn test_audio_reads_only_relay_fields() {
    let raw = json!({
        "url": "https://mmg.whatsapp.net/x",
        "mimetype": "audio/ogg; codecs=opus",
        "seconds": 7,
        "ptt": true,
        "mediaKey": "abc",
        "waveform": "AAAA"
    });
    let msg = decode_value("audioMessage", &raw).unwrap();
    assert_eq!(
        msg,
        NormalizedMessage::Audio {
            mimetype: Some("audio/ogg; codecs=opus".to_string()),
            seconds: Some(7),
            voice_note: true,
            attachment: None,
        }
    );
}

#[test]
fn test_image_and_document() {
    let msg = decode_value("imageMessage", &json!({"url": "https://x/i.jpg", "caption": "look"})).unwrap();
    assert_eq!(
        msg,
        NormalizedMessage::Image {
            url: "https://x/i.jpg".to_string(),
            caption: Some("look".to_string())
        }
    );

    let msg = decode_value("documentMessage", &json!({"url": "https://x/d", "title": "Invoice"})).unwrap();
    assert_eq!(
        msg,
        NormalizedMessage::Document {
            url: "https://x/d".to_string(),
            filename: Some("Invoice".to_string())
        }
    );
}

#[test]
fn test_missing_optional_fields_do_not_fail() {
    for message_type in ["conversation", "audioMessage", "imageMessage", "documentMessage"] {
        assert!(decode(message_type, b"{}").is_ok(), "{message_type}");
    }
}

#[test]
fn test_silent_types_are_unsupported() {
    for message_type in ["protocolMessage", "reactionMessage", "senderKeyDistributionMessage"] {
        let msg = decode(message_type, b"{}").unwrap();
        assert_eq!(msg.kind(), "unsupported");
    }
}

#[test]
fn test_unknown_type_fails_with_unsupported_content() {
    let err = decode("pollCreationMessage", b"{}").unwrap_err();
    assert!(matches!(err, RelayError::UnsupportedContent(_)));
}

#[test]
fn test_malformed_json_fails_with_decode() {
    assert!(matches!(decode("conversation", b"{\"text\": "), Err(RelayError::Decode(_))));
    assert!(matches!(
        decode_value("audioMessage", &json!({"ptt": "yes"})),
        Err(RelayError::Decode(_))
    ));
}

#[test]
fn test_decode_is_total_over_message_types() {
    let types = [
        "conversation",
        "extendedTextMessage",
        "audioMessage",
        "imageMessage",
        "documentMessage",
        "protocolMessage",
        "stickerMessage",
        "",
    ];
    for message_type in types {
        match decode(message_type, br#"{"text": "x"}"#) {
            Ok(msg) => assert!(!msg.kind().is_empty()),
            Err(RelayError::UnsupportedContent(_)) | Err(RelayError::Decode(_)) => {}
            Err(other) => panic!("unexpected error for {message_type}: {other}"),
        }
    }
}
