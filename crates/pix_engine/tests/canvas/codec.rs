use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_binary_round_trip() {
    let samples = [(0, 0, 0), (1, 2, 3), (255, 256, 7), (1000, 999, 9), (65535, 0, 15), (65535, 65535, 15)];
    for (x, y, index) in samples {
        let update = PixelUpdate::indexed(x, y, index);
        let frame = PixelCodec::BinaryIndexed.encode(&update).unwrap();
        assert_eq!(frame.len(), BINARY_FRAME_LEN);
        assert_eq!(PixelCodec::BinaryIndexed.decode(&frame), Decoded::Single(update));
    }
}

#[test]
fn test_binary_rejection_boundary() {
    assert_eq!(
        encode_binary(&PixelUpdate::indexed(65536, 0, 0)),
        Err(CanvasError::EncodeRange { field: "x", value: 65536 })
    );
    assert_eq!(
        encode_binary(&PixelUpdate::indexed(0, -1, 0)),
        Err(CanvasError::EncodeRange { field: "y", value: -1 })
    );
    assert_eq!(
        encode_binary(&PixelUpdate::indexed(0, 0, 16)),
        Err(CanvasError::EncodeRange { field: "color", value: 16 })
    );
    assert_eq!(encode_binary(&PixelUpdate::indexed(0, 0, 0)), Ok([0, 0, 0, 0, 0]));
    assert_eq!(encode_binary(&PixelUpdate::indexed(65535, 65535, 15)), Ok([0xFF, 0xFF, 0xFF, 0xFF, 0x0F]));
}

#[test]
fn test_binary_little_endian_layout() {
    let frame = encode_binary(&PixelUpdate::indexed(0x1234, 0x0102, 5)).unwrap();
    assert_eq!(frame, [0x34, 0x12, 0x02, 0x01, 0x05]);
}

#[test]
fn test_click_scenario_bytes() {
    let (x, y) = PixelMapper::new(10).cell_at(105, 47, 0, 0);
    assert_eq!((x, y), (10, 4));
    let frame = PixelCodec::BinaryIndexed.encode(&PixelUpdate::indexed(x, y, 3)).unwrap();
    assert_eq!(frame, WireFrame::Binary(vec![0x0A, 0x00, 0x04, 0x00, 0x03]));
    assert_eq!(frame.to_string(), "0A 00 04 00 03");
}

#[test]
fn test_text_round_trip() {
    let update = PixelUpdate::rgb(12, 34, Color::new(0x12, 0x34, 0x56));
    let frame = PixelCodec::TextStructured.encode(&update).unwrap();
    assert_eq!(frame, WireFrame::Text(r#"{"x":12,"y":34,"color":1193046}"#.to_string()));
    assert_eq!(PixelCodec::TextStructured.decode(&frame), Decoded::Single(update));
}

#[test]
fn test_text_refuses_indexed_color() {
    assert!(matches!(
        PixelCodec::TextStructured.encode(&PixelUpdate::indexed(0, 0, 1)),
        Err(CanvasError::EncodeRange { field: "color", .. })
    ));
}

#[test]
fn test_text_batch_isolates_failures() {
    let text = r##"[
        {"x": 0, "y": 0, "color": "#ff0000"},
        {"x": 1, "y": 1},
        {"x": 2, "y": 2, "color": "nope"},
        {"x": 3, "y": 3, "color": "#0000ff"}
    ]"##;
    let Decoded::Batch(items) = decode_text(text) else {
        panic!("expected a batch");
    };
    assert_eq!(items.len(), 4);
    assert_eq!(items[0], Ok(PixelUpdate::rgb(0, 0, Color::new(0xFF, 0, 0))));
    assert!(matches!(items[1], Err(CanvasError::FrameParse { .. })));
    assert!(matches!(items[2], Err(CanvasError::FrameParse { .. })));
    assert_eq!(items[3], Ok(PixelUpdate::rgb(3, 3, Color::new(0, 0, 0xFF))));
}

#[test]
fn test_text_coordinates_survive_for_validation() {
    // negative coordinates decode fine; bounds are the validator's job
    let decoded = decode_text(r##"{"x": -1, "y": 0, "color": "#00ff00"}"##);
    assert_eq!(decoded, Decoded::Single(PixelUpdate::rgb(-1, 0, Color::new(0, 0xFF, 0))));

    let huge = decode_text(r##"{"x": 4294967296, "y": 0, "color": "#00ff00"}"##);
    assert!(matches!(huge, Decoded::Malformed(CanvasError::FrameParse { .. })));
}

#[test]
fn test_binary_batch_is_one_frame_per_update() {
    let updates = [PixelUpdate::indexed(1, 1, 1), PixelUpdate::indexed(2, 2, 2)];
    let frames = PixelCodec::BinaryIndexed.encode_batch(&updates).unwrap();
    assert_eq!(
        frames,
        vec![WireFrame::Binary(vec![1, 0, 1, 0, 1]), WireFrame::Binary(vec![2, 0, 2, 0, 2])]
    );

    let bad = [PixelUpdate::indexed(1, 1, 1), PixelUpdate::indexed(2, 2, 20)];
    assert!(PixelCodec::BinaryIndexed.encode_batch(&bad).is_err());
}
