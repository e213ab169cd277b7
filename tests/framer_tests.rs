//! Integration tests for the packet framer: magic resync, length-prefixed
//! extraction and stability across arbitrary stream splits.

use uwb_bridge_rs::uwb::FrameBuffer;

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xDC, 0xAC];
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn drain(fb: &mut FrameBuffer) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(p) = fb.next_payload() {
        out.push(p);
    }
    out
}

/// A clean stream of frames comes back payload by payload.
#[test]
fn test_sequential_frames() {
    let mut fb = FrameBuffer::new();
    fb.push(&frame(&[1]));
    fb.push(&frame(&[2, 3]));
    fb.push(&frame(&[4, 5, 6]));
    assert_eq!(drain(&mut fb), vec![vec![1], vec![2, 3], vec![4, 5, 6]]);
}

/// Garbage before and between frames is discarded one octet at a time.
#[test]
fn test_resync_between_frames() {
    let mut stream = Vec::new();
    stream.extend_from_slice(b"boot banner\r\n");
    stream.extend_from_slice(&frame(&[0xAA]));
    stream.extend_from_slice(&[0xDC, 0x00, 0xFF]); // false magic start
    stream.extend_from_slice(&frame(&[0xBB, 0xCC]));

    let mut fb = FrameBuffer::new();
    fb.push(&stream);
    assert_eq!(drain(&mut fb), vec![vec![0xAA], vec![0xBB, 0xCC]]);
    assert!(fb.resync_count() > 0);
}

/// Splitting the byte stream at every possible boundary yields the same
/// payload sequence as parsing it in one blob.
#[test]
fn test_split_boundary_equivalence() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&[0x13, 0x37]);
    stream.extend_from_slice(&frame(&[9, 8, 7]));
    stream.extend_from_slice(&[0xDC]); // lone magic byte, swallowed by next frame hunt
    stream.extend_from_slice(&frame(&[6]));
    stream.extend_from_slice(&frame(&[]));

    let mut whole = FrameBuffer::new();
    whole.push(&stream);
    let expected = drain(&mut whole);

    for split in 0..=stream.len() {
        let mut fb = FrameBuffer::new();
        fb.push(&stream[..split]);
        let mut got = drain(&mut fb);
        fb.push(&stream[split..]);
        got.extend(drain(&mut fb));
        assert_eq!(got, expected, "split at {split}");
    }
}

/// A payload length larger than the buffered bytes waits for the rest.
#[test]
fn test_incomplete_payload_waits() {
    let mut fb = FrameBuffer::new();
    let full = frame(&[1, 2, 3, 4, 5]);
    fb.push(&full[..6]);
    assert_eq!(fb.next_payload(), None);
    fb.push(&full[6..]);
    assert_eq!(fb.next_payload(), Some(vec![1, 2, 3, 4, 5]));
}

/// `clear` drops buffered bytes so a reset starts from a clean slate.
#[test]
fn test_clear_discards_partial_frame() {
    let mut fb = FrameBuffer::new();
    let full = frame(&[1, 2, 3]);
    fb.push(&full[..5]);
    fb.clear();
    fb.push(&frame(&[7]));
    assert_eq!(drain(&mut fb), vec![vec![7]]);
}
