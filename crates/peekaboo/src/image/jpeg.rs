use std::{fmt, panic::catch_unwind, str::FromStr};

use anyhow::{anyhow, bail};
use image::{ImageFormat, RgbaImage};

use super::Image;

/// JPEG decoders that camera frames can be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JpegBackend {
    /// Mozilla's libjpeg fork through the `mozjpeg` bindings. The faster choice.
    #[default]
    MozJpeg,
    /// Uses the pure-Rust decoder bundled with the `image` crate. Slower, but needs no C toolchain.
    JpegDecoder,
}

impl FromStr for JpegBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mozjpeg" => Ok(Self::MozJpeg),
            "jpeg-decoder" => Ok(Self::JpegDecoder),
            _ => bail!("unknown JPEG backend '{s}' (expected `mozjpeg` or `jpeg-decoder`)"),
        }
    }
}

impl fmt::Display for JpegBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MozJpeg => "mozjpeg",
            Self::JpegDecoder => "jpeg-decoder",
        })
    }
}

pub(super) fn decode_jpeg(data: &[u8], backend: JpegBackend) -> anyhow::Result<Image> {
    let buf = match backend {
        JpegBackend::MozJpeg => decode_mozjpeg(data)?,
        JpegBackend::JpegDecoder => {
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgba8()
        }
    };
    Ok(Image { buf })
}

fn decode_mozjpeg(data: &[u8]) -> anyhow::Result<RgbaImage> {
    // Corrupt input makes mozjpeg panic instead of returning an error.
    let decoded = catch_unwind(|| -> anyhow::Result<_> {
        let mut decoder = mozjpeg::Decompress::new_mem(data)?;
        // Camera frames are small, so trade a little quality for speed.
        decoder.dct_method(mozjpeg::DctMethod::IntegerFast);
        decoder.do_fancy_upsampling(false);

        let mut started = decoder.rgba()?;
        let (width, height) = (started.width(), started.height());
        let pixels = started
            .read_scanlines_flat()
            .ok_or_else(|| anyhow!("truncated JPEG data"))?;
        Ok((u32::try_from(width)?, u32::try_from(height)?, pixels))
    });
    let (width, height, pixels) = decoded
        .map_err(|panic| anyhow!("invalid JPEG data: {}", crate::panic_message(panic)))??;

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("mozjpeg returned {width}x{height} with a wrong buffer size"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageOutputFormat, Rgb, RgbImage};

    use super::*;

    fn encode(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(95))
            .unwrap();
        out
    }

    #[test]
    fn parse_backend() {
        assert_eq!("mozjpeg".parse::<JpegBackend>().unwrap(), JpegBackend::MozJpeg);
        assert_eq!(
            "jpeg-decoder".parse::<JpegBackend>().unwrap(),
            JpegBackend::JpegDecoder
        );
        assert!("turbojpeg".parse::<JpegBackend>().is_err());
        assert_eq!(JpegBackend::default().to_string(), "mozjpeg");
    }

    #[test]
    fn decodes_with_every_backend() {
        let jpeg = encode(24, 16);
        for backend in [JpegBackend::MozJpeg, JpegBackend::JpegDecoder] {
            let image = decode_jpeg(&jpeg, backend).unwrap();
            assert_eq!((image.width(), image.height()), (24, 16), "{backend}");
            let c = image.get(12, 8);
            assert!(c.r() > 150 && c.g() < 80 && c.b() < 80, "{backend}: {c:?}");
            assert_eq!(c.a(), 255);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_jpeg(b"not a jpeg", JpegBackend::JpegDecoder).is_err());
    }
}
