use std::fs;
use std::path::PathBuf;

use avdegrade::archive::{ArchiveSink, FRAME_MARKER};
use avdegrade::capture::frame::Frame;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("avdegrade-{}-{name}.y4m", std::process::id()))
}

#[test]
fn three_frames_dump_to_header_plus_three_records() {
    let path = scratch_path("three");
    let mut sink = ArchiveSink::create(&path, 64, 64, 30).unwrap();
    for luma in [10, 20, 30] {
        sink.write(&Frame::solid(64, 64, luma, 100, 150).unwrap()).unwrap();
    }
    drop(sink.into_inner().unwrap());

    let data = fs::read(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let header = b"YUV4MPEG2 W64 H64 F30:1 Ip A0:0 C420jpeg\n";
    assert!(data.starts_with(header));

    let record_len = FRAME_MARKER.len() + 64 * 64 + 2 * (32 * 32);
    let records = &data[header.len()..];
    assert_eq!(records.len(), 3 * record_len);

    for (record, luma) in records.chunks_exact(record_len).zip([10, 20, 30]) {
        let (marker, planes) = record.split_at(FRAME_MARKER.len());
        assert_eq!(marker, FRAME_MARKER);
        let (y, chroma) = planes.split_at(64 * 64);
        assert!(y.iter().all(|&p| p == luma));
        let (u, v) = chroma.split_at(32 * 32);
        assert!(u.iter().all(|&p| p == 100));
        assert!(v.iter().all(|&p| p == 150));
    }
}

#[test]
fn post_degrade_dump_skips_the_startup_frame() {
    let path = scratch_path("after");
    let mut sink = ArchiveSink::create(&path, 16, 16, 25).unwrap().skip_first(1);
    sink.write(&Frame::placeholder(16, 16).unwrap()).unwrap();
    sink.write(&Frame::solid(16, 16, 1, 2, 3).unwrap()).unwrap();
    assert_eq!(sink.frames(), 1);
    drop(sink.into_inner().unwrap());

    let data = fs::read(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let header = b"YUV4MPEG2 W16 H16 F25:1 Ip A0:0 C420jpeg\n";
    assert_eq!(data.len(), header.len() + FRAME_MARKER.len() + 16 * 16 * 3 / 2);
    // the placeholder would have put 255 right after the marker
    assert_eq!(data[header.len() + FRAME_MARKER.len()], 1);
}

#[test]
fn dump_without_records_still_carries_the_header() {
    let path = scratch_path("empty");
    let mut sink = ArchiveSink::create(&path, 32, 16, 30).unwrap().skip_first(1);
    sink.write(&Frame::placeholder(32, 16).unwrap()).unwrap();
    drop(sink.into_inner().unwrap());

    let data = fs::read(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(data, b"YUV4MPEG2 W32 H16 F30:1 Ip A0:0 C420jpeg\n");
}
