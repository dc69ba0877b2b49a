use tessera_image::{Image, ImageError, LegacyImage};
use tessera_tensor::{DType, Device, Tensor};

fn filled(rows: usize, cols: usize, channels: usize, dtype: DType) -> Result<Image, ImageError> {
    let ramp: Vec<f64> = (0..rows * cols * channels).map(|i| i as f64 * 1.5).collect();
    let tensor = Tensor::from_shape_vec(&[rows, cols, channels], ramp, Device::Cpu)?;
    Image::from_tensor(&tensor.cast(dtype)?)
}

#[test]
fn round_trip_supported_layouts() -> Result<(), ImageError> {
    for dtype in [DType::U8, DType::U16, DType::F32] {
        for channels in [1, 3, 4] {
            let image = filled(3, 5, channels, dtype)?;
            let legacy = image.to_legacy()?;
            assert_eq!(legacy.bytes_per_channel, dtype.size_in_bytes());
            assert!(legacy.has_data());

            let back = Image::from_legacy(&legacy, Device::Cpu)?;
            assert_eq!(back.dtype(), dtype);
            assert_eq!(back.channels(), channels);
            assert_eq!(back.as_tensor().shape(), image.as_tensor().shape());
            assert_eq!(back.as_tensor().to_bytes()?, image.as_tensor().to_bytes()?);
            assert!(!back.as_tensor().shares_storage(image.as_tensor()));
        }
    }
    Ok(())
}

#[test]
fn legacy_round_trip_from_the_legacy_side() -> Result<(), ImageError> {
    let mut legacy = LegacyImage::new(4, 2, 3, 1)?;
    for (i, b) in legacy.data.iter_mut().enumerate() {
        *b = (i * 7 % 256) as u8;
    }
    let image = Image::from_legacy(&legacy, Device::Cpu)?;
    assert_eq!(image.to_legacy()?, legacy);
    Ok(())
}

#[test]
fn empty_round_trip() -> Result<(), ImageError> {
    let image = Image::create(0, 0, 3, DType::U8, Device::Cpu)?;
    let legacy = image.to_legacy()?;
    assert!(legacy.is_empty());
    let back = Image::from_legacy(&legacy, Device::Cpu)?;
    assert!(back.is_empty());
    Ok(())
}
