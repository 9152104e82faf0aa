//! Local file frame sink using FFmpeg.
//!
//! Encodes RGB24 frames as MPEG-4 Part 2 (the `mp4v` family) in YUV420P, with
//! one tick of the stream time base per frame. The container is chosen by
//! FFmpeg from the output file extension.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use ffmpeg::util::format::pixel::Pixel;

use crate::frame::{Frame, VideoMetadata};

pub(crate) struct FfmpegFileSink {
    path: String,
    output: ffmpeg::format::context::Output,
    stream_index: usize,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl FfmpegFileSink {
    pub(crate) fn create(path: &str, metadata: &VideoMetadata) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create video output '{}' with ffmpeg", path))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg build has no MPEG-4 encoder"))?;

        let frame_rate = metadata.frame_rate.max(1) as i32;
        let encoder_time_base = ffmpeg::Rational::new(1, frame_rate);

        let (stream_index, encoder) = {
            let mut stream = output
                .add_stream(codec)
                .context("add video stream to output")?;
            let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
                .encoder()
                .video()
                .context("create ffmpeg video encoder")?;
            encoder.set_width(metadata.width);
            encoder.set_height(metadata.height);
            encoder.set_format(Pixel::YUV420P);
            encoder.set_time_base(encoder_time_base);
            encoder.set_frame_rate(Some(ffmpeg::Rational::new(frame_rate, 1)));
            if global_header {
                encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
            }
            let encoder = encoder.open_as(codec).context("open ffmpeg video encoder")?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            (stream.index(), encoder)
        };

        output
            .write_header()
            .with_context(|| format!("write container header to '{}'", path))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| anyhow!("output stream vanished after header"))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            Pixel::RGB24,
            metadata.width,
            metadata.height,
            Pixel::YUV420P,
            metadata.width,
            metadata.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            output,
            stream_index,
            encoder,
            scaler,
            encoder_time_base,
            stream_time_base,
            width: metadata.width,
            height: metadata.height,
            next_pts: 0,
        })
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (row, src) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            data.get_mut(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .with_context(|| format!("encode frame #{} into '{}'", frame.index(), self.path))?;
        self.drain_packets()
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush ffmpeg encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .with_context(|| format!("write container trailer to '{}'", self.path))
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .with_context(|| format!("write packet to '{}'", self.path))?;
        }
        Ok(())
    }
}
