//! HTK feature file reader.
//!
//! File layout (all fields big-endian):
//!
//! ```text
//! [4B sample_count] [4B sample_period] [2B sample_size] [2B parm_kind]
//! If parm_kind has _C and the base kind is not IREFC:
//!   [veclen x 4B f32 scale A] [veclen x 4B f32 bias B]
//! sample_count frames of sample_size bytes:
//!   _C set:   veclen x 2B i16, value = (raw + B) / A
//!   _C unset: veclen x 4B f32
//! If parm_kind has _K: an optional trailing checksum element
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use bytes::{Buf, BufMut};
use tracing::debug;

use crate::error::{Error, Result};

/// Size of the fixed header prologue.
pub const HEADER_SIZE: usize = 12;

/// Scale used for compressed IREFC data, which carries no scale/bias vectors.
pub const IREFC_SCALE: f32 = 32767.0;

/// Base parameter kind stored in the low 6 bits of `parm_kind`.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Waveform = 0,
    Lpc = 1,
    LpRefc = 2,
    LpCepstra = 3,
    LpDelCep = 4,
    Irefc = 5,
    Mfcc = 6,
    Fbank = 7,
    MelSpec = 8,
    User = 9,
    Discrete = 10,
    Plp = 11,
}

impl BaseKind {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => BaseKind::Waveform,
            1 => BaseKind::Lpc,
            2 => BaseKind::LpRefc,
            3 => BaseKind::LpCepstra,
            4 => BaseKind::LpDelCep,
            5 => BaseKind::Irefc,
            6 => BaseKind::Mfcc,
            7 => BaseKind::Fbank,
            8 => BaseKind::MelSpec,
            9 => BaseKind::User,
            10 => BaseKind::Discrete,
            11 => BaseKind::Plp,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseKind::Waveform => "WAVEFORM",
            BaseKind::Lpc => "LPC",
            BaseKind::LpRefc => "LPREFC",
            BaseKind::LpCepstra => "LPCEPSTRA",
            BaseKind::LpDelCep => "LPDELCEP",
            BaseKind::Irefc => "IREFC",
            BaseKind::Mfcc => "MFCC",
            BaseKind::Fbank => "FBANK",
            BaseKind::MelSpec => "MELSPEC",
            BaseKind::User => "USER",
            BaseKind::Discrete => "DISCRETE",
            BaseKind::Plp => "PLP",
        }
    }
}

/// The `parm_kind` header field: a base kind plus qualifier flags.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ParmKind(u16);

impl ParmKind {
    pub const BASE_MASK: u16 = 0x3f;

    /// `_E` has energy.
    pub const ENERGY: u16 = 0o000100;
    /// `_N` absolute energy suppressed.
    pub const NO_ABS_ENERGY: u16 = 0o000200;
    /// `_D` has delta coefficients.
    pub const DELTA: u16 = 0o000400;
    /// `_A` has acceleration coefficients.
    pub const ACCEL: u16 = 0o001000;
    /// `_C` is compressed.
    pub const COMPRESSED: u16 = 0o002000;
    /// `_Z` has zero mean static coefficients.
    pub const ZERO_MEAN: u16 = 0o004000;
    /// `_K` has CRC checksum.
    pub const CHECKSUM: u16 = 0o010000;
    /// `_O` has 0th cepstral coefficient.
    pub const ZEROTH_CEP: u16 = 0o020000;
    /// `_V` has VQ data.
    pub const VQ: u16 = 0o040000;
    /// `_T` has third differential coefficients.
    pub const THIRD_DIFF: u16 = 0o100000;

    const QUALIFIERS: [(u16, &'static str); 10] = [
        (Self::ENERGY, "_E"),
        (Self::NO_ABS_ENERGY, "_N"),
        (Self::DELTA, "_D"),
        (Self::ACCEL, "_A"),
        (Self::COMPRESSED, "_C"),
        (Self::ZERO_MEAN, "_Z"),
        (Self::CHECKSUM, "_K"),
        (Self::ZEROTH_CEP, "_O"),
        (Self::VQ, "_V"),
        (Self::THIRD_DIFF, "_T"),
    ];

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub const fn base_code(self) -> u16 {
        self.0 & Self::BASE_MASK
    }

    pub fn base(self) -> Option<BaseKind> {
        BaseKind::from_code(self.base_code())
    }

    pub const fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    pub const fn has_checksum(self) -> bool {
        self.contains(Self::CHECKSUM)
    }

    pub const fn sample_kind(self) -> SampleKind {
        if self.is_compressed() {
            SampleKind::Compressed
        } else {
            SampleKind::Float
        }
    }
}

impl fmt::Display for ParmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base() {
            Some(base) => f.write_str(base.name())?,
            None => write!(f, "ANON({})", self.base_code())?,
        }
        for (flag, name) in Self::QUALIFIERS {
            if self.contains(flag) {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ParmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParmKind({self}, {:#o})", self.0)
    }
}

/// On-disk element type of frame vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// 16-bit integers reconstructed through scale/bias vectors.
    Compressed,
    /// 32-bit floats.
    Float,
}

impl SampleKind {
    pub const fn width(self) -> usize {
        match self {
            SampleKind::Compressed => 2,
            SampleKind::Float => 4,
        }
    }
}

/// Element decoder selected from the header.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoding {
    Float,
    Compressed { scale: Vec<f32>, bias: Vec<f32> },
}

impl Decoding {
    pub fn sample_kind(&self) -> SampleKind {
        match self {
            Decoding::Float => SampleKind::Float,
            Decoding::Compressed { .. } => SampleKind::Compressed,
        }
    }

    /// Decodes one frame of raw big-endian elements into `out`.
    pub fn decode_frame(&self, raw: &[u8], out: &mut Vec<f32>) {
        match self {
            Decoding::Float => {
                let mut buf = raw;
                while buf.remaining() >= 4 {
                    out.push(buf.get_f32());
                }
            }
            Decoding::Compressed { scale, bias } => {
                let mut buf = raw;
                for (a, b) in scale.iter().zip(bias) {
                    if buf.remaining() < 2 {
                        break;
                    }
                    out.push((buf.get_i16() as f32 + b) / a);
                }
            }
        }
    }
}

/// The 12-byte feature file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureHeader {
    pub sample_count: u32,
    /// Frame period in 100ns units.
    pub sample_period: u32,
    /// Bytes per stored frame.
    pub sample_size: u16,
    pub parm_kind: ParmKind,
}

impl FeatureHeader {
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &buf[..];
        Self {
            sample_count: buf.get_u32(),
            sample_period: buf.get_u32(),
            sample_size: buf.get_u16(),
            parm_kind: ParmKind::from_bits(buf.get_u16()),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32(self.sample_count);
        buf.put_u32(self.sample_period);
        buf.put_u16(self.sample_size);
        buf.put_u16(self.parm_kind.bits());
        out
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(self.sample_period as u64 * 100)
    }
}

/// Frames requested from a feature file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSpan {
    /// Every frame in the file, written in listings as `[0,0]`.
    WholeFile,
    /// Inclusive frame range.
    Range { start: u64, end: u64 },
}

impl FrameSpan {
    pub fn new(start: u64, end: u64) -> Self {
        if start == 0 && end == 0 {
            FrameSpan::WholeFile
        } else {
            FrameSpan::Range { start, end }
        }
    }

    /// Frame count of a range, or `None` for the whole file.
    pub fn frame_count(&self) -> Result<Option<u64>> {
        match *self {
            FrameSpan::WholeFile => Ok(None),
            FrameSpan::Range { start, end } => Ok(Some(range_len(start, end)?)),
        }
    }
}

/// Frame bytes together with the number of frames they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrames {
    pub bytes: Vec<u8>,
    pub frame_count: u64,
}

impl RawFrames {
    /// Encodes decoded frames as big-endian f32 elements.
    pub fn from_decoded(frames: &[Vec<f32>]) -> Self {
        let mut bytes = Vec::with_capacity(frames.iter().map(|f| f.len() * 4).sum());
        for v in frames.iter().flatten() {
            bytes.put_f32(*v);
        }
        Self {
            bytes,
            frame_count: frames.len() as u64,
        }
    }
}

fn range_len(start: u64, end: u64) -> Result<u64> {
    if end < start {
        return Err(Error::FrameRangeInvalid { start, end });
    }
    (end - start)
        .checked_add(1)
        .ok_or(Error::FrameRangeInvalid { start, end })
}

/// Reader over a single HTK feature file.
pub struct FeatureReader<R = BufReader<File>> {
    inner: R,
    header: FeatureHeader,
    decoding: Decoding,
    veclen: usize,
    data_offset: u64,
}

impl FeatureReader<BufReader<File>> {
    /// Opens a feature file and parses its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> FeatureReader<R> {
    /// Parses the header (and compression vectors) from `inner`.
    pub fn new(mut inner: R) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE];
        read_header_bytes(&mut inner, &mut buf)?;
        let header = FeatureHeader::parse(&buf);

        let kind = header.parm_kind.sample_kind();
        let size = header.sample_size as usize;
        if size == 0 || size % kind.width() != 0 {
            return Err(Error::InvalidHeader(format!(
                "sample size {size} is not a positive multiple of {}",
                kind.width()
            )));
        }
        let veclen = size / kind.width();

        let decoding = match kind {
            SampleKind::Float => Decoding::Float,
            SampleKind::Compressed if header.parm_kind.base() == Some(BaseKind::Irefc) => {
                Decoding::Compressed {
                    scale: vec![IREFC_SCALE; veclen],
                    bias: vec![0.0; veclen],
                }
            }
            SampleKind::Compressed => {
                let scale = read_f32_vec(&mut inner, veclen)?;
                let bias = read_f32_vec(&mut inner, veclen)?;
                Decoding::Compressed { scale, bias }
            }
        };
        let data_offset = inner.stream_position()?;

        Ok(Self {
            inner,
            header,
            decoding,
            veclen,
            data_offset,
        })
    }

    pub fn header(&self) -> &FeatureHeader {
        &self.header
    }

    pub fn decoding(&self) -> &Decoding {
        &self.decoding
    }

    /// Number of coefficients per frame.
    pub fn veclen(&self) -> usize {
        self.veclen
    }

    /// Byte offset of frame 0.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    fn sample_size(&self) -> usize {
        self.header.sample_size as usize
    }

    /// Seeks to frame `index`. Returns false if its offset does not fit in a u64.
    fn seek_frame(&mut self, index: u64) -> Result<bool> {
        let pos = index
            .checked_mul(self.header.sample_size as u64)
            .and_then(|off| off.checked_add(self.data_offset));
        let Some(pos) = pos else {
            return Ok(false);
        };
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(true)
    }

    /// Reads at most `frame_bytes` per frame of `[start, end]`, stopping at
    /// end of file. Returns the bytes read and the byte count requested.
    fn read_span_bytes(
        &mut self,
        start: u64,
        end: u64,
        frame_bytes: u64,
    ) -> Result<(Vec<u8>, u64)> {
        let count = range_len(start, end)?;
        let want = count
            .checked_mul(frame_bytes)
            .ok_or(Error::FrameRangePastEnd { start, end })?;
        if !self.seek_frame(start)? {
            return Err(Error::FrameRangePastEnd { start, end });
        }
        let mut bytes = Vec::new();
        (&mut self.inner).take(want).read_to_end(&mut bytes)?;
        Ok((bytes, want))
    }

    fn decode_frames(&self, raw: &[u8]) -> Vec<Vec<f32>> {
        raw.chunks_exact(self.sample_size())
            .map(|frame| {
                let mut out = Vec::with_capacity(self.veclen);
                self.decoding.decode_frame(frame, &mut out);
                out
            })
            .collect()
    }

    /// Reads the next frame at the current position, `None` at end of data.
    ///
    /// An incomplete trailing frame counts as end of data.
    pub fn next_frame(&mut self) -> Result<Option<Vec<f32>>> {
        let size = self.sample_size();
        let mut raw = Vec::with_capacity(size);
        (&mut self.inner).take(size as u64).read_to_end(&mut raw)?;
        if raw.len() < size {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.veclen);
        self.decoding.decode_frame(&raw, &mut out);
        Ok(Some(out))
    }

    /// Iterates decoded frames from the first frame onwards.
    pub fn frames(&mut self) -> Result<Frames<'_, R>> {
        self.seek_frame(0)?;
        Ok(Frames {
            reader: self,
            done: false,
        })
    }

    /// Reads every stored frame without decoding.
    ///
    /// With `_K` set, a trailing checksum element is dropped when the
    /// element count disagrees with the declared sample count.
    pub fn read_raw_all(&mut self) -> Result<RawFrames> {
        self.seek_frame(0)?;
        let mut bytes = Vec::new();
        self.inner.read_to_end(&mut bytes)?;

        let width = self.decoding.sample_kind().width();
        let elements = bytes.len() / width;
        let declared = self.header.sample_count as usize * self.veclen;
        if self.header.parm_kind.has_checksum() {
            if elements == declared {
                debug!("feature header sets _K but no checksum follows the data");
            } else if elements > 0 {
                bytes.truncate((elements - 1) * width);
            }
        }

        let frame_count = bytes.len() / self.sample_size();
        let whole = frame_count * self.sample_size();
        if whole != bytes.len() {
            debug!(
                trailing = bytes.len() - whole,
                "ignoring incomplete trailing frame"
            );
            bytes.truncate(whole);
        }

        Ok(RawFrames {
            bytes,
            frame_count: frame_count as u64,
        })
    }

    /// Reads and decodes every frame in the file.
    pub fn read_all(&mut self) -> Result<Vec<Vec<f32>>> {
        let raw = self.read_raw_all()?;
        Ok(self.decode_frames(&raw.bytes))
    }

    /// Reads and decodes the inclusive frame range `[start, end]`.
    ///
    /// Fails with `FrameRangePastEnd` unless every frame is present.
    pub fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<Vec<f32>>> {
        let (raw, want) = self.read_span_bytes(start, end, self.sample_size() as u64)?;
        if (raw.len() as u64) < want {
            return Err(Error::FrameRangePastEnd { start, end });
        }
        Ok(self.decode_frames(&raw))
    }

    /// Reads `(end - start + 1) * veclen * 4` bytes starting at frame `start`
    /// without decoding. The result is shorter if the file ends first.
    pub fn read_raw_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        let (bytes, want) = self.read_span_bytes(start, end, self.veclen as u64 * 4)?;
        if (bytes.len() as u64) < want {
            debug!(want, got = bytes.len(), "raw frame read stopped at end of file");
        }
        Ok(bytes)
    }

    /// Reads `span` as big-endian f32 frames of `veclen` elements.
    ///
    /// Float files are copied through unchanged. Compressed files are
    /// decoded first. A range that runs past the last frame fails with
    /// `FrameRangePastEnd`.
    pub fn read_raw_span(&mut self, span: FrameSpan) -> Result<RawFrames> {
        let compressed = self.header.parm_kind.is_compressed();
        match span {
            FrameSpan::WholeFile if compressed => Ok(RawFrames::from_decoded(&self.read_all()?)),
            FrameSpan::WholeFile => self.read_raw_all(),
            FrameSpan::Range { start, end } if compressed => {
                Ok(RawFrames::from_decoded(&self.read_range(start, end)?))
            }
            FrameSpan::Range { start, end } => {
                let frame_count = range_len(start, end)?;
                let bytes = self.read_raw_range(start, end)?;
                if (bytes.len() as u64) < frame_count * self.veclen as u64 * 4 {
                    return Err(Error::FrameRangePastEnd { start, end });
                }
                Ok(RawFrames { bytes, frame_count })
            }
        }
    }
}

/// Iterator over decoded frames, see [`FeatureReader::frames`].
pub struct Frames<'a, R> {
    reader: &'a mut FeatureReader<R>,
    done: bool,
}

impl<R: Read + Seek> Iterator for Frames<'_, R> {
    type Item = Result<Vec<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_header_bytes<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::InvalidHeader(format!(
            "file is shorter than the {} byte header",
            buf.len()
        )),
        _ => Error::Io(e),
    })
}

fn read_f32_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<f32>> {
    let mut raw = vec![0u8; len * 4];
    read_header_bytes(r, &mut raw)?;
    let mut buf = &raw[..];
    Ok((0..len).map(|_| buf.get_f32()).collect())
}
