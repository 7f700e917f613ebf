use kommpad_bridge_lib::config::{LayerIndex, Rotation, SlotKey};
use kommpad_bridge_lib::serial::protocol::is_identification;
use kommpad_bridge_lib::serial::{DeviceEvent, LineDecoder};

#[test]
fn test_decode_event_stream_split_across_reads() {
    let mut decoder = LineDecoder::new();
    let mut events = Vec::new();
    for chunk in [&b"butt"[..], &b"on2 layer3\r\nencod"[..], &b"er3_cw layer0\nKommPong\n"[..]] {
        events.extend(decoder.push(chunk).iter().filter_map(|l| DeviceEvent::parse(l)));
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].slot, SlotKey::Button(2));
    assert_eq!(events[0].layer, LayerIndex(3));
    assert_eq!(events[1].slot, SlotKey::EncoderTurn(3, Rotation::Clockwise));
}

#[test]
fn test_rejects_out_of_range_and_malformed_events() {
    for line in ["button7 layer0", "button1 layer4", "button1", "button1 layer0 extra", "dial1 layer0", "Button1 layer0"] {
        assert!(DeviceEvent::parse(line).is_none(), "{} should be ignored", line);
    }
}

#[test]
fn test_identification_is_substring_match() {
    assert!(is_identification("noise KommPong noise"));
    assert!(is_identification("KommPong"));
    assert!(!is_identification("kommpong"));
    assert!(!is_identification("Komm Pong"));
}
