use proptest::prelude::*;
use webssh_relay::relay::bridge::{Frame, Utf8Framer};

fn frame_all(chunks: &[Vec<u8>]) -> Vec<Frame> {
    let mut framer = Utf8Framer::new();
    let mut frames: Vec<Frame> = chunks.iter().filter_map(|c| framer.push(c)).collect();
    frames.extend(framer.finish());
    frames
}

proptest! {
    #[test]
    fn framed_bytes_equal_input(chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16)) {
        let frames = frame_all(&chunks);
        let out: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();
        let input: Vec<u8> = chunks.concat();
        prop_assert_eq!(out, input);
    }

    #[test]
    fn split_text_is_never_sent_as_binary(text in "\\PC{0,40}", cuts in proptest::collection::vec(0usize..200, 0..6)) {
        let bytes = text.as_bytes();
        let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(bytes[start..p].to_vec());
            start = p;
        }
        chunks.push(bytes[start..].to_vec());

        let frames = frame_all(&chunks);
        let mut joined = String::new();
        for frame in frames {
            match frame {
                Frame::Text(s) => joined.push_str(&s),
                Frame::Binary(b) => prop_assert!(false, "unexpected binary frame: {:?}", b),
            }
        }
        prop_assert_eq!(joined, text);
    }
}
