//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a container and converts every picture to
//! packed RGB24 in-memory. The decoder is flushed at end of input so trailing
//! buffered pictures are not lost.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::{Frame, VideoMetadata};

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    metadata: VideoMetadata,
    next_index: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video input '{}' with ffmpeg", path))?;
        let (stream_index, parameters, frame_rate, total_frames) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("'{}' has no video track", path))?;
            (
                stream.index(),
                stream.parameters(),
                stream_frame_rate(&stream),
                stream.frames().max(0) as u64,
            )
        };
        let context = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            total_frames,
        };

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            metadata,
            next_index: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) => {
                    if index != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .with_context(|| format!("decode packet from '{}'", self.path))?;
                }
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        let index = self.next_index;
        self.next_index += 1;
        Frame::new(index, width, height, pixels)
    }
}

fn stream_frame_rate(stream: &ffmpeg::format::stream::Stream) -> u32 {
    let avg = stream.avg_frame_rate();
    let rate = if avg.denominator() != 0 && avg.numerator() > 0 {
        avg
    } else {
        stream.rate()
    };
    if rate.denominator() == 0 {
        return 0;
    }
    let fps = f64::from(rate);
    if fps.is_finite() && fps > 0.0 {
        fps as u32
    } else {
        0
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((
            data.get(..row_bytes * height as usize)
                .context("ffmpeg frame is shorter than its dimensions")?
                .to_vec(),
            width,
            height,
        ));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
