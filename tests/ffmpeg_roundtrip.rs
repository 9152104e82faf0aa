#![cfg(feature = "video-ffmpeg")]

use tempfile::tempdir;

use vision_guard::{FileSink, FileSource, FrameSink, FrameSource};

#[test]
fn encoded_video_decodes_with_source_properties() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let output = output.to_str().unwrap();

    let mut clip =
        FileSource::open("stub://clip?frames=3&fps=10&width=64&height=48").unwrap();
    let metadata = clip.metadata();
    let mut sink = FileSink::create(output, &metadata).unwrap();
    while let Some(frame) = clip.next_frame() {
        sink.write(&frame).unwrap();
    }
    sink.finish().unwrap();
    assert_eq!(sink.frames_written(), 3);
    drop(sink);

    let mut decoded = FileSource::open(output).unwrap();
    let reopened = decoded.metadata();
    assert_eq!(reopened.width, 64);
    assert_eq!(reopened.height, 48);
    assert_eq!(reopened.frame_rate, 10);

    let mut indices = Vec::new();
    while let Some(frame) = decoded.next_frame() {
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        indices.push(frame.index());
    }
    assert_eq!(indices, vec![0, 1, 2]);
}
