//! Codec Tests
//!
//! Tests for message encoding/decoding and malformed input handling.

use bytes::Bytes;
use rcmd::protocol::{
    decode_command, decode_message, decode_message_with_limit, encode_command, encode_message,
    Command, CommandType, Message, MessageKind, Reply, ReplyKind, HEADER_SIZE, MAX_PATH_LEN,
};
use rcmd::RcmdError;

fn assert_malformed(bytes: &[u8], needle: &str) {
    match decode_message(bytes) {
        Err(RcmdError::Malformed(msg)) => {
            assert!(msg.contains(needle), "'{}' does not mention '{}'", msg, needle)
        }
        other => panic!("Expected Malformed error, got {:?}", other),
    }
}

/// Hand-build a message with an arbitrary tag and body
fn raw_frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![tag];
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(body);
    bytes
}

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_touch() {
    let cmd = Command::touch("dir/file.txt");
    let encoded = encode_command(&cmd);
    let decoded = decode_command(&encoded).unwrap();

    assert_eq!(decoded, cmd);
    assert_eq!(decoded.command_type(), CommandType::Touch);
    assert_eq!(decoded.path(), "dir/file.txt");
}

#[test]
fn test_encode_decode_write() {
    let cmd = Command::write("out.bin", 4096, Bytes::from_static(b"payload"));
    let encoded = encode_command(&cmd);
    let decoded = decode_command(&encoded).unwrap();

    match decoded {
        Command::Write {
            path,
            offset,
            length,
            data,
        } => {
            assert_eq!(path, "out.bin");
            assert_eq!(offset, 4096);
            assert_eq!(length, 7);
            assert_eq!(&data[..], b"payload");
        }
        _ => panic!("Expected WRITE command"),
    }
}

#[test]
fn test_encode_decode_write_empty_data() {
    let cmd = Command::write("empty", 0, Bytes::new());
    let decoded = decode_command(&encode_command(&cmd)).unwrap();
    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_binary_write_data() {
    let data: Vec<u8> = (0..=255).collect();
    let cmd = Command::write("bin", 1, data.clone());
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    match decoded {
        Command::Write { data: got, .. } => assert_eq!(&got[..], &data[..]),
        _ => panic!("Expected WRITE command"),
    }
}

#[test]
fn test_encode_command_matches_encode_message() {
    let cmd = Command::write("a", 3, Bytes::from_static(b"xyz"));
    assert_eq!(encode_command(&cmd), encode_message(&Message::Command(cmd)));
}

// =============================================================================
// Other Message Kinds
// =============================================================================

#[test]
fn test_encode_decode_replies() {
    for reply in [Reply::touch(0), Reply::touch(1), Reply::write(42), Reply::write(-13)] {
        let decoded = decode_message(&encode_message(&Message::Reply(reply))).unwrap();
        assert_eq!(decoded, Message::Reply(reply));
    }
}

#[test]
fn test_reply_success() {
    assert!(Reply::touch(0).is_success());
    assert!(Reply::write(12).is_success());
    assert!(!Reply::write(-2).is_success());
    assert_eq!(Reply::touch(0).kind, ReplyKind::Touch);
}

#[test]
fn test_encode_decode_quit() {
    let encoded = encode_message(&Message::Quit);
    assert_eq!(decode_message(&encoded).unwrap(), Message::Quit);
}

#[test]
fn test_encode_decode_raw() {
    let msg = Message::raw(Bytes::from_static(b"   0Hello World!"));
    assert_eq!(decode_message(&encode_message(&msg)).unwrap(), msg);

    let empty = Message::raw(Bytes::new());
    assert_eq!(decode_message(&encode_message(&empty)).unwrap(), empty);
}

#[test]
fn test_decode_command_rejects_non_command() {
    let encoded = encode_message(&Message::Quit);
    match decode_command(&encoded) {
        Err(RcmdError::Malformed(msg)) => assert!(msg.contains("Expected a command")),
        other => panic!("Expected Malformed error, got {:?}", other),
    }
}

// =============================================================================
// Wire Format Tests
// =============================================================================

#[test]
fn test_touch_wire_format() {
    let encoded = encode_command(&Command::touch("ab"));

    // tag, body length 6, path length 2, "ab"
    assert_eq!(
        &encoded[..],
        &[0x00, 0, 0, 0, 6, 0, 0, 0, 2, b'a', b'b']
    );
}

#[test]
fn test_write_wire_format() {
    let encoded = encode_command(&Command::write("f", 2, Bytes::from_static(b"hi")));

    let mut expected = vec![0x02, 0, 0, 0, 23];
    expected.extend_from_slice(&[0, 0, 0, 1, b'f']);
    expected.extend_from_slice(&2u64.to_be_bytes());
    expected.extend_from_slice(&2u64.to_be_bytes());
    expected.extend_from_slice(b"hi");

    assert_eq!(&encoded[..], &expected[..]);
}

#[test]
fn test_reply_and_quit_wire_format() {
    let encoded = encode_message(&Message::Reply(Reply::write(-5)));
    assert_eq!(encoded[0], MessageKind::WriteReply as u8);
    assert_eq!(&encoded[1..5], &8u32.to_be_bytes());
    assert_eq!(&encoded[5..], &(-5i64).to_be_bytes());

    let quit = encode_message(&Message::Quit);
    assert_eq!(&quit[..], &[0x04, 0, 0, 0, 4, b'Q', b'U', b'I', b'T']);
}

#[test]
fn test_header_size() {
    let encoded = encode_message(&Message::raw(Bytes::new()));
    assert_eq!(encoded.len(), HEADER_SIZE);
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_decode_incomplete_header() {
    assert_malformed(&[], "Incomplete header");
    assert_malformed(&[0x00, 0, 0], "Incomplete header");
}

#[test]
fn test_decode_unknown_tag() {
    assert_malformed(&raw_frame(0x7f, b""), "Unknown message tag: 0x7f");
}

#[test]
fn test_unknown_tag_reported_before_length_checks() {
    // Declares a huge body but carries none
    let bytes = [0xee, 0xff, 0xff, 0xff, 0xff];
    assert_malformed(&bytes, "Unknown message tag");
}

#[test]
fn test_decode_incomplete_body() {
    let mut encoded = encode_command(&Command::touch("file")).to_vec();
    encoded.pop();
    assert_malformed(&encoded, "Incomplete body");
}

#[test]
fn test_decode_trailing_bytes() {
    let mut encoded = encode_command(&Command::touch("file")).to_vec();
    encoded.push(0);
    assert_malformed(&encoded, "Trailing bytes");
}

#[test]
fn test_decode_body_over_limit() {
    let encoded = encode_message(&Message::raw(vec![0u8; 64]));
    match decode_message_with_limit(&encoded, 32) {
        Err(RcmdError::Malformed(msg)) => assert!(msg.contains("Body too large")),
        other => panic!("Expected Malformed error, got {:?}", other),
    }
    assert!(decode_message_with_limit(&encoded, 64).is_ok());
}

#[test]
fn test_write_length_mismatch_rejected() {
    let cmd = Command::Write {
        path: "f".to_string(),
        offset: 0,
        length: 10,
        data: Bytes::from_static(b"abc"),
    };
    assert_malformed(&encode_command(&cmd), "declared length 10 but carries 3 bytes");
}

#[test]
fn test_write_truncated_offset() {
    // path "f" then only 4 of the 8 offset bytes
    let body = [0, 0, 0, 1, b'f', 0, 0, 0, 0];
    assert_malformed(&raw_frame(0x02, &body), "truncated offset");
}

#[test]
fn test_touch_path_length_exceeds_body() {
    let body = [0, 0, 0, 9, b'a', b'b'];
    assert_malformed(&raw_frame(0x00, &body), "truncated path");
}

#[test]
fn test_touch_trailing_field_bytes() {
    let body = [0, 0, 0, 1, b'a', b'z'];
    assert_malformed(&raw_frame(0x00, &body), "unexpected trailing bytes");
}

#[test]
fn test_path_too_long() {
    let path = "p".repeat(MAX_PATH_LEN + 1);
    assert_malformed(&encode_command(&Command::touch(path)), "exceeds 4095");

    let ok = "p".repeat(MAX_PATH_LEN);
    assert!(decode_command(&encode_command(&Command::touch(ok))).is_ok());
}

#[test]
fn test_path_not_utf8() {
    let body = [0, 0, 0, 2, 0xff, 0xfe];
    assert_malformed(&raw_frame(0x00, &body), "not UTF-8");
}

#[test]
fn test_quit_bad_sentinel() {
    assert_malformed(&raw_frame(0x04, b"EXIT"), "bad sentinel");
    assert_malformed(&raw_frame(0x04, b"QU"), "truncated sentinel");
    assert_malformed(&raw_frame(0x04, b"QUITX"), "unexpected trailing bytes");
}

#[test]
fn test_reply_wrong_size() {
    assert_malformed(&raw_frame(0x01, &[0, 0, 0, 1]), "truncated status");
}
