use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{GrayImage, ImageFormat, Luma};
use mp4::{AvcConfig, HevcConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer, TrackConfig, TrackType};
use openh264::encoder::{Encoder, EncoderConfig};
use openh264::Timestamp;
use openh264::formats::YUVBuffer;
use tiff::encoder::{TiffEncoder, colortype};
use tiff_play::config::DecodeLimits;
use tiff_play::error::PlayError;
use tiff_play::frame_source::{FrameSource, RawFrame, Samples, SourceFormat};
use tiff_play::normalize::{FrameStats, to_grayscale};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_temp_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock error")
        .as_nanos();
    let seq = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("tiff-play-test-{nanos}-{seq}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn collect(path: &Path) -> Vec<Result<RawFrame, PlayError>> {
    FrameSource::open(path, &DecodeLimits::default())
        .expect("open source")
        .collect()
}

// ---------- TIFF ----------

#[test]
fn five_page_tiff_yields_five_frames_in_order() {
    let dir = unique_temp_dir();
    let path = dir.join("stack.tiff");
    {
        let mut encoder =
            TiffEncoder::new(BufWriter::new(File::create(&path).expect("create"))).expect("encoder");
        for page in 0..5u16 {
            let data = vec![page * 100; 4 * 3];
            encoder
                .write_image::<colortype::Gray16>(4, 3, &data)
                .expect("write page");
        }
    }

    let mut source = FrameSource::open(&path, &DecodeLimits::default()).expect("open");
    assert_eq!(source.format(), SourceFormat::Tiff);

    for page in 0..5u16 {
        let frame = source.next().expect("frame present").expect("frame decodes");
        assert_eq!((frame.width(), frame.height(), frame.channels()), (4, 3, 1));
        assert_eq!(frame.samples(), &Samples::U16(vec![page * 100; 12]));
    }
    assert!(source.next().is_none());
    assert!(source.next().is_none());
    assert_eq!(source.frames_read(), 5);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn twelve_bit_tiff_page_is_stretched_to_full_range() {
    let dir = unique_temp_dir();
    let path = dir.join("deep.tif");
    {
        let mut encoder =
            TiffEncoder::new(BufWriter::new(File::create(&path).expect("create"))).expect("encoder");
        encoder
            .write_image::<colortype::Gray16>(3, 1, &[0, 2048, 4095])
            .expect("write page");
    }

    let frames = collect(&path);
    assert_eq!(frames.len(), 1);
    let frame = frames[0].as_ref().expect("frame decodes");
    let stats = FrameStats::measure(frame);
    let gray = to_grayscale(frame);

    assert!(stats.rescaled);
    assert_eq!(stats.max, 4095.0);
    assert_eq!(gray.as_raw(), &vec![0u8, 127, 255]);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn rgb_tiff_keeps_three_channels_until_normalized() {
    let dir = unique_temp_dir();
    let path = dir.join("color.tif");
    {
        let mut encoder =
            TiffEncoder::new(BufWriter::new(File::create(&path).expect("create"))).expect("encoder");
        encoder
            .write_image::<colortype::RGB8>(2, 1, &[255, 0, 0, 0, 255, 0])
            .expect("write page");
    }

    let frames = collect(&path);
    let frame = frames[0].as_ref().expect("frame decodes");
    assert_eq!(frame.channels(), 3);

    let gray = to_grayscale(frame);
    assert_eq!(gray.as_raw(), &vec![76u8, 150]);

    let _ = std::fs::remove_dir_all(dir);
}

// ---------- 分派 ----------

#[test]
fn unknown_extension_is_rejected_before_opening() {
    let result = FrameSource::open("data.bin", &DecodeLimits::default());

    assert!(matches!(result, Err(PlayError::UnsupportedFormat(_))));
}

#[test]
fn missing_file_is_a_filesystem_error() {
    let dir = unique_temp_dir();
    let result = FrameSource::open(dir.join("missing.tiff"), &DecodeLimits::default());

    assert!(matches!(result, Err(PlayError::FileSystem(_))));

    let _ = std::fs::remove_dir_all(dir);
}

// ---------- AVI ----------

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut body = kind.to_vec();
    for child in children {
        body.extend_from_slice(child);
    }
    chunk(b"LIST", &body)
}

fn bitmap_info(width: i32, height: i32, bit_count: u16, compression: &[u8; 4]) -> Vec<u8> {
    let mut data = vec![0u8; 40];
    data[0..4].copy_from_slice(&40u32.to_le_bytes());
    data[4..8].copy_from_slice(&width.to_le_bytes());
    data[8..12].copy_from_slice(&height.to_le_bytes());
    data[12..14].copy_from_slice(&1u16.to_le_bytes());
    data[14..16].copy_from_slice(&bit_count.to_le_bytes());
    data[16..20].copy_from_slice(compression);
    data
}

fn strl(kind: &[u8; 4], format: &[u8]) -> Vec<u8> {
    let mut strh = vec![0u8; 56];
    strh[0..4].copy_from_slice(kind);
    list(b"strl", &[chunk(b"strh", &strh), chunk(b"strf", format)])
}

/// 由若干 `strl` 与 `movi` 子块拼出完整 AVI，`trailer` 放在 `movi` 之后（如 `idx1`）。
fn avi_file(strls: &[Vec<u8>], movi_children: &[Vec<u8>], trailer: &[Vec<u8>]) -> Vec<u8> {
    let mut header = vec![chunk(b"avih", &[0u8; 56])];
    header.extend_from_slice(strls);

    let mut body = b"AVI ".to_vec();
    body.extend_from_slice(&list(b"hdrl", &header));
    body.extend_from_slice(&list(b"movi", movi_children));
    for child in trailer {
        body.extend_from_slice(child);
    }
    chunk(b"RIFF", &body)
}

fn build_avi(format: Vec<u8>, frame_id: &[u8; 4], payloads: &[Vec<u8>]) -> Vec<u8> {
    let frames: Vec<Vec<u8>> = payloads.iter().map(|p| chunk(frame_id, p)).collect();
    avi_file(&[strl(b"vids", &format)], &frames, &[])
}

/// 2x2、24 位、自底向上存储的均匀灰色帧（每行补 2 字节对齐）。
fn dib_gray_frame(value: u8) -> Vec<u8> {
    let row = [value, value, value, value, value, value, 0, 0];
    [row, row].concat()
}

#[test]
fn uncompressed_avi_yields_frames_in_order() {
    let dir = unique_temp_dir();
    let path = dir.join("raw.avi");
    let payloads = vec![dib_gray_frame(10), dib_gray_frame(20), dib_gray_frame(30)];
    std::fs::write(&path, build_avi(bitmap_info(2, 2, 24, &[0; 4]), b"00db", &payloads))
        .expect("write avi");

    let frames = collect(&path);

    assert_eq!(frames.len(), 3);
    for (frame, expected) in frames.iter().zip([10u8, 20, 30]) {
        let frame = frame.as_ref().expect("frame decodes");
        assert_eq!((frame.width(), frame.height(), frame.channels()), (2, 2, 1));
        assert_eq!(frame.samples(), &Samples::U8(vec![expected; 4]));
    }

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn bottom_up_avi_frames_are_flipped_upright() {
    let dir = unique_temp_dir();
    let path = dir.join("rows.avi");
    // 文件中先存最底行（值 200），再存顶行（值 50）
    let payload = [
        [200, 200, 200, 200, 200, 200, 0, 0],
        [50, 50, 50, 50, 50, 50, 0, 0],
    ]
    .concat();
    std::fs::write(&path, build_avi(bitmap_info(2, 2, 24, &[0; 4]), b"00db", &[payload]))
        .expect("write avi");

    let frames = collect(&path);
    let frame = frames[0].as_ref().expect("frame decodes");

    assert_eq!(frame.samples(), &Samples::U8(vec![50, 50, 200, 200]));

    let _ = std::fs::remove_dir_all(dir);
}

fn jpeg_bytes(value: u8) -> Vec<u8> {
    let image = GrayImage::from_pixel(8, 8, Luma([value]));
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Jpeg)
        .expect("encode jpeg");
    cursor.into_inner()
}

#[test]
fn mjpeg_avi_frames_decode_to_gray() {
    let dir = unique_temp_dir();
    let path = dir.join("motion.avi");
    let payloads = vec![jpeg_bytes(40), jpeg_bytes(180)];
    std::fs::write(&path, build_avi(bitmap_info(8, 8, 24, b"MJPG"), b"00dc", &payloads))
        .expect("write avi");

    let frames = collect(&path);

    assert_eq!(frames.len(), 2);
    for (frame, expected) in frames.iter().zip([40i32, 180]) {
        let frame = frame.as_ref().expect("frame decodes");
        assert_eq!((frame.width(), frame.height()), (8, 8));
        let Samples::U8(values) = frame.samples() else {
            panic!("MJPEG frames decode to 8-bit gray");
        };
        assert!(values.iter().all(|v| (*v as i32 - expected).abs() <= 2));
    }

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn truncated_avi_chunk_reports_frame_index_then_ends() {
    let dir = unique_temp_dir();
    let path = dir.join("cut.avi");
    let payloads = vec![dib_gray_frame(10), dib_gray_frame(20), dib_gray_frame(30)];
    let mut bytes = build_avi(bitmap_info(2, 2, 24, &[0; 4]), b"00db", &payloads);
    bytes.truncate(bytes.len() - 4);
    std::fs::write(&path, bytes).expect("write avi");

    let mut source = FrameSource::open(&path, &DecodeLimits::default()).expect("open");

    assert!(source.next().expect("frame 0").is_ok());
    assert!(source.next().expect("frame 1").is_ok());
    assert!(matches!(
        source.next(),
        Some(Err(PlayError::Decode { index: 2, .. }))
    ));
    assert!(source.next().is_none());
    assert_eq!(source.frames_read(), 2);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn avi_with_unsupported_codec_fails_at_open() {
    let dir = unique_temp_dir();
    let path = dir.join("h264.avi");
    std::fs::write(
        &path,
        build_avi(bitmap_info(2, 2, 24, b"H264"), b"00dc", &[vec![0u8; 4]]),
    )
    .expect("write avi");

    let result = FrameSource::open(&path, &DecodeLimits::default());

    assert!(matches!(result, Err(PlayError::UnsupportedFormat(_))));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn oversized_avi_frames_hit_the_pixel_limit() {
    let dir = unique_temp_dir();
    let path = dir.join("huge.avi");
    std::fs::write(
        &path,
        build_avi(bitmap_info(2, 2, 24, &[0; 4]), b"00db", &[dib_gray_frame(1)]),
    )
    .expect("write avi");
    let limits = DecodeLimits {
        max_decoded_pixels: 3,
        ..DecodeLimits::default()
    };

    let result = FrameSource::open(&path, &limits);

    assert!(matches!(result, Err(PlayError::ResourceLimit(_))));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn palette_avi_frames_map_indices_through_the_color_table() {
    let dir = unique_temp_dir();
    let path = dir.join("palette.avi");
    let mut format = bitmap_info(2, 1, 8, &[0; 4]);
    format[32..36].copy_from_slice(&2u32.to_le_bytes());
    // 调色板项为 BGRA：0 号红色，1 号白色
    format.extend_from_slice(&[0, 0, 255, 0, 255, 255, 255, 0]);
    std::fs::write(&path, build_avi(format, b"00db", &[vec![0, 1, 0, 0]])).expect("write avi");

    let frames = collect(&path);

    assert_eq!(frames.len(), 1);
    let frame = frames[0].as_ref().expect("frame decodes");
    assert_eq!(frame.samples(), &Samples::U8(vec![76, 255]));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn bgrx_avi_frames_ignore_the_padding_byte() {
    let dir = unique_temp_dir();
    let path = dir.join("bgrx.avi");
    // 红色与蓝色像素，第四字节为填充
    let payload = vec![0, 0, 255, 99, 255, 0, 0, 99];
    std::fs::write(&path, build_avi(bitmap_info(2, 1, 32, b"DIB "), b"00db", &[payload]))
        .expect("write avi");

    let frames = collect(&path);

    let frame = frames[0].as_ref().expect("frame decodes");
    assert_eq!(frame.samples(), &Samples::U8(vec![76, 29]));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn frames_inside_rec_lists_are_read_in_order() {
    let dir = unique_temp_dir();
    let path = dir.join("rec.avi");
    let movi = vec![
        list(b"rec ", &[chunk(b"00db", &dib_gray_frame(11))]),
        list(b"rec ", &[chunk(b"00db", &dib_gray_frame(22))]),
        chunk(b"00db", &dib_gray_frame(33)),
    ];
    std::fs::write(&path, avi_file(&[strl(b"vids", &bitmap_info(2, 2, 24, &[0; 4]))], &movi, &[]))
        .expect("write avi");

    let frames = collect(&path);

    assert_eq!(frames.len(), 3);
    for (frame, expected) in frames.iter().zip([11u8, 22, 33]) {
        let frame = frame.as_ref().expect("frame decodes");
        assert_eq!(frame.samples(), &Samples::U8(vec![expected; 4]));
    }

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn video_stream_after_audio_skips_audio_and_dropped_chunks() {
    let dir = unique_temp_dir();
    let path = dir.join("av.avi");
    let strls = [
        strl(b"auds", &[0u8; 18]),
        strl(b"vids", &bitmap_info(2, 2, 24, &[0; 4])),
    ];
    let movi = vec![
        chunk(b"00wb", &[1, 2, 3, 4]),
        chunk(b"01db", &dib_gray_frame(60)),
        chunk(b"00wb", &[5, 6, 7, 8]),
        chunk(b"01dc", &[]),
        chunk(b"00db", &dib_gray_frame(250)),
        chunk(b"01db", &dib_gray_frame(70)),
    ];
    let idx1 = chunk(b"idx1", &[0u8; 16]);
    std::fs::write(&path, avi_file(&strls, &movi, &[idx1])).expect("write avi");

    let mut source = FrameSource::open(&path, &DecodeLimits::default()).expect("open");

    let first = source.next().expect("frame 0").expect("decodes");
    let second = source.next().expect("frame 1").expect("decodes");
    assert_eq!(first.samples(), &Samples::U8(vec![60; 4]));
    assert_eq!(second.samples(), &Samples::U8(vec![70; 4]));
    assert!(source.next().is_none());
    assert_eq!(source.frames_read(), 2);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn avix_extension_segments_continue_the_frame_sequence() {
    let dir = unique_temp_dir();
    let path = dir.join("opendml.avi");
    let format = bitmap_info(2, 2, 24, &[0; 4]);
    let mut bytes = avi_file(
        &[strl(b"vids", &format)],
        &[chunk(b"00db", &dib_gray_frame(5))],
        &[],
    );
    let mut avix = b"AVIX".to_vec();
    avix.extend_from_slice(&list(
        b"movi",
        &[chunk(b"00db", &dib_gray_frame(15)), chunk(b"00db", &dib_gray_frame(25))],
    ));
    bytes.extend_from_slice(&chunk(b"RIFF", &avix));
    std::fs::write(&path, bytes).expect("write avi");

    let frames = collect(&path);

    assert_eq!(frames.len(), 3);
    for (frame, expected) in frames.iter().zip([5u8, 15, 25]) {
        let frame = frame.as_ref().expect("frame decodes");
        assert_eq!(frame.samples(), &Samples::U8(vec![expected; 4]));
    }

    let _ = std::fs::remove_dir_all(dir);
}

// ---------- MP4 ----------

/// 去掉编码器输出 NAL 前面的 `00 00 01` / `00 00 00 01` 起始码。
fn nal_payload(nal: &[u8]) -> &[u8] {
    match nal {
        [0, 0, 1, rest @ ..] => rest,
        [0, 0, 0, 1, rest @ ..] => rest,
        _ => nal,
    }
}

fn mp4_config() -> Mp4Config {
    Mp4Config {
        major_brand: "isom".parse().expect("brand"),
        minor_version: 512,
        compatible_brands: ["isom", "iso2", "avc1", "mp41"]
            .iter()
            .map(|b| b.parse().expect("brand"))
            .collect(),
        timescale: 1000,
    }
}

/// 用 OpenH264 编码若干帧均匀灰色画面，写成单轨 H.264 MP4。
fn write_h264_mp4(path: &Path, size: u16, levels: &[u8]) {
    let mut encoder = Encoder::with_config(
        EncoderConfig::new(size as u32, size as u32)
            .enable_skip_frame(false)
            .max_frame_rate(25.0)
            .set_bitrate_bps(2_000_000),
    )
    .expect("encoder");

    let mut sps = None;
    let mut pps = None;
    let mut samples = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        let rgb = vec![level; size as usize * size as usize * 3];
        let yuv = YUVBuffer::with_rgb(size as usize, size as usize, &rgb);
        let bitstream = encoder
            .encode_at(&yuv, Timestamp::from_millis(i as u64 * 40))
            .expect("encode frame");

        let mut sample = Vec::new();
        for layer_idx in 0..bitstream.num_layers() {
            let layer = bitstream.layer(layer_idx).expect("layer");
            for nal_idx in 0..layer.nal_count() {
                let nal = nal_payload(layer.nal_unit(nal_idx).expect("nal"));
                match nal[0] & 0x1F {
                    7 => {
                        sps.get_or_insert_with(|| nal.to_vec());
                    }
                    8 => {
                        pps.get_or_insert_with(|| nal.to_vec());
                    }
                    _ => {
                        sample.extend_from_slice(&(nal.len() as u32).to_be_bytes());
                        sample.extend_from_slice(nal);
                    }
                }
            }
        }
        samples.push(sample);
    }

    let file = File::create(path).expect("create mp4");
    let mut writer = Mp4Writer::write_start(file, &mp4_config()).expect("mp4 writer");
    writer
        .add_track(&TrackConfig {
            track_type: TrackType::Video,
            timescale: 1000,
            language: "und".to_string(),
            media_conf: MediaConfig::AvcConfig(AvcConfig {
                width: size,
                height: size,
                seq_param_set: sps.expect("encoder emits SPS"),
                pic_param_set: pps.expect("encoder emits PPS"),
            }),
        })
        .expect("add track");

    for (i, sample) in samples.into_iter().enumerate() {
        writer
            .write_sample(
                1,
                &Mp4Sample {
                    start_time: i as u64 * 40,
                    duration: 40,
                    rendering_offset: 0,
                    is_sync: i == 0,
                    bytes: mp4::Bytes::from(sample),
                },
            )
            .expect("write sample");
    }
    writer.write_end().expect("finish mp4");
}

fn mean(values: &[u8]) -> f64 {
    values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64
}

#[test]
fn h264_mp4_yields_every_encoded_frame_as_gray() {
    let dir = unique_temp_dir();
    let path = dir.join("clip.mp4");
    let levels = [30u8, 90, 150, 210, 120];
    write_h264_mp4(&path, 64, &levels);

    let mut source = FrameSource::open(&path, &DecodeLimits::default()).expect("open");
    assert_eq!(source.format(), SourceFormat::Mp4);

    let mut means = Vec::new();
    for frame in source.by_ref() {
        let frame = frame.expect("frame decodes");
        assert_eq!((frame.width(), frame.height(), frame.channels()), (64, 64, 1));
        let Samples::U8(values) = frame.samples() else {
            panic!("H.264 frames decode to 8-bit gray");
        };
        means.push(mean(values));
    }

    assert_eq!(means.len(), levels.len());
    assert!(source.next().is_none());
    assert_eq!(source.frames_read(), levels.len());

    // 编码端 RGB→YUV 使用有限范围 Y，解码端不再展开，灰度约为 0.86 * v + 16
    for (got, level) in means.iter().zip(levels) {
        let expected = 0.859375 * level as f64 + 16.0;
        assert!(
            (got - expected).abs() <= 8.0,
            "level {level}: mean {got:.1}, expected about {expected:.1}"
        );
    }
    assert!(means[0] < means[1] && means[1] < means[2] && means[2] < means[3]);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn non_h264_mp4_track_is_unsupported() {
    let dir = unique_temp_dir();
    let path = dir.join("hevc.mp4");
    {
        let file = File::create(&path).expect("create mp4");
        let mut writer = Mp4Writer::write_start(file, &mp4_config()).expect("mp4 writer");
        writer
            .add_track(&TrackConfig {
                track_type: TrackType::Video,
                timescale: 1000,
                language: "und".to_string(),
                media_conf: MediaConfig::HevcConfig(HevcConfig {
                    width: 32,
                    height: 32,
                }),
            })
            .expect("add track");
        writer
            .write_sample(
                1,
                &Mp4Sample {
                    start_time: 0,
                    duration: 40,
                    rendering_offset: 0,
                    is_sync: true,
                    bytes: mp4::Bytes::from(vec![0, 0, 0, 2, 0x26, 0x01]),
                },
            )
            .expect("write sample");
        writer.write_end().expect("finish mp4");
    }

    let result = FrameSource::open(&path, &DecodeLimits::default());

    assert!(matches!(result, Err(PlayError::UnsupportedFormat(_))));

    let _ = std::fs::remove_dir_all(dir);
}
