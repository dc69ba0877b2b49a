use tessera_tensor::{DType, Device, Tensor};

use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use tessera_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

fn checked_dim(value: i64, min: i64, name: &str) -> Result<usize, ImageError> {
    if value < min {
        return Err(ImageError::invalid_argument(format!(
            "{name} must be >= {min}, got {value}"
        )));
    }
    usize::try_from(value)
        .map_err(|_| ImageError::invalid_argument(format!("{name} {value} does not fit in memory")))
}

fn checked_index(value: i64, size: usize, name: &str) -> Result<usize, ImageError> {
    match usize::try_from(value) {
        Ok(i) if i < size => Ok(i),
        _ => Err(ImageError::invalid_argument(format!(
            "{name} index {value} out of range [0, {size})"
        ))),
    }
}

/// Represents an image with pixel data.
///
/// The image is backed by a single rank 3 [`Tensor`] with shape `{rows, cols, channels}`.
/// Geometry, dtype and device are always read from that tensor.
///
/// Cloning an image, like cloning a tensor, produces a second handle on the
/// same pixels. Use [`Image::convert_to`] with `copy = true` for an independent image.
///
/// # Examples
///
/// ```
/// use tessera_image::Image;
/// use tessera_tensor::{DType, Device};
///
/// let image = Image::create(480, 640, 3, DType::U8, Device::Cpu).unwrap();
/// assert_eq!(image.rows(), 480);
/// assert_eq!(image.cols(), 640);
/// assert_eq!(image.channels(), 3);
/// assert_eq!(image.to_string(), "Image[size={480,640}, channels=3, u8, cpu]");
/// ```
#[derive(Clone, Debug)]
pub struct Image {
    data: Tensor,
}

impl Image {
    /// Create a new zero-filled image.
    ///
    /// # Arguments
    ///
    /// * `rows` - Number of rows, at least 0.
    /// * `cols` - Number of columns, at least 0.
    /// * `channels` - Number of channels, at least 1.
    /// * `dtype` - Element data type.
    /// * `device` - Device where the pixels are stored.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidArgument`] for out of range geometry. Nothing is allocated then.
    pub fn create(
        rows: i64,
        cols: i64,
        channels: i64,
        dtype: DType,
        device: Device,
    ) -> Result<Self, ImageError> {
        let rows = checked_dim(rows, 0, "rows")?;
        let cols = checked_dim(cols, 0, "cols")?;
        let channels = checked_dim(channels, 1, "channels")?;
        let data = Tensor::zeros(&[rows, cols, channels], dtype, device)?;
        Ok(Self { data })
    }

    /// Create a new zero-filled `f32` image on the host.
    pub fn new(rows: i64, cols: i64, channels: i64) -> Result<Self, ImageError> {
        Self::create(rows, cols, channels, DType::F32, Device::Cpu)
    }

    /// Wrap an existing tensor without copying.
    ///
    /// A rank 2 tensor `{rows, cols}` is viewed as a single channel image. The
    /// image and the tensor share storage: writes through either are visible
    /// through the other.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidArgument`] if the tensor is not contiguous or its rank is not 2 or 3.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self, ImageError> {
        if !tensor.is_contiguous() {
            return Err(ImageError::invalid_argument(
                "image tensor must be contiguous",
            ));
        }
        let data = match tensor.shape() {
            &[rows, cols] => tensor.reshape(&[rows, cols, 1])?,
            &[_, _, _] => tensor.clone(),
            shape => {
                return Err(ImageError::invalid_argument(format!(
                    "image tensor must have rank 2 or 3, got shape {shape:?}"
                )))
            }
        };
        Ok(Self { data })
    }

    /// Drop the pixels, keeping channels, dtype and device.
    ///
    /// Other handles on the old pixels are not affected.
    pub fn clear(&mut self) -> Result<&mut Self, ImageError> {
        self.data = Tensor::zeros(&[0, 0, self.channels()], self.dtype(), self.device())?;
        Ok(self)
    }

    /// Returns true if the image holds no pixel data.
    pub fn is_empty(&self) -> bool {
        self.data.numel() == 0
    }

    /// Number of rows (image height).
    #[inline]
    pub fn rows(&self) -> usize {
        self.data.shape()[0]
    }

    /// Number of columns (image width).
    #[inline]
    pub fn cols(&self) -> usize {
        self.data.shape()[1]
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.data.shape()[2]
    }

    /// Element data type.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Device where the pixels are stored.
    #[inline]
    pub fn device(&self) -> Device {
        self.data.device()
    }

    /// Image size in pixels.
    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.cols(),
            height: self.rows(),
        }
    }

    /// The pixel at `(r, c)` as a live view.
    ///
    /// The view is rank 0 for single channel images and rank 1 with `channels`
    /// entries otherwise. Writing to it writes to the image.
    pub fn at(&self, r: i64, c: i64) -> Result<Tensor, ImageError> {
        let pixel = self.pixel(r, c)?;
        if self.channels() == 1 {
            return Ok(pixel.index(0)?);
        }
        Ok(pixel)
    }

    /// Channel `ch` of the pixel at `(r, c)` as a live rank 0 view.
    pub fn at_channel(&self, r: i64, c: i64, ch: i64) -> Result<Tensor, ImageError> {
        let ch = checked_index(ch, self.channels(), "channel")?;
        Ok(self.pixel(r, c)?.index(ch)?)
    }

    fn pixel(&self, r: i64, c: i64) -> Result<Tensor, ImageError> {
        let r = checked_index(r, self.rows(), "row")?;
        let c = checked_index(c, self.cols(), "col")?;
        Ok(self.data.index(r)?.index(c)?)
    }

    /// The smallest pixel coordinate, always `{0, 0}`, as an `i64` host tensor.
    pub fn get_min_bound(&self) -> Result<Tensor, ImageError> {
        Ok(Tensor::zeros(&[2], DType::I64, Device::Cpu)?)
    }

    /// The pixel extent `{rows, cols}` as an `i64` host tensor.
    pub fn get_max_bound(&self) -> Result<Tensor, ImageError> {
        let bound = vec![self.rows() as i64, self.cols() as i64];
        Ok(Tensor::from_shape_vec(&[2], bound, Device::Cpu)?)
    }

    /// The backing tensor. Shares storage with the image.
    pub fn as_tensor(&self) -> &Tensor {
        &self.data
    }

    /// Consumes the image and returns the backing tensor.
    pub fn into_tensor(self) -> Tensor {
        self.data
    }

    /// Address of the first pixel.
    pub fn data_ptr(&self) -> *const u8 {
        self.data.data_ptr()
    }
}

impl Default for Image {
    /// An empty single channel `f32` host image.
    fn default() -> Self {
        Self {
            data: Tensor::empty(DType::F32, &[0, 1]),
        }
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Image[size={{{},{}}}, channels={}, {}, {}]",
            self.rows(),
            self.cols(),
            self.channels(),
            self.dtype(),
            self.device()
        )
    }
}
