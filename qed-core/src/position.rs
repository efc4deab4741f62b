use std::borrow::Cow;
use std::str::FromStr;
use std::{fmt, ops};

pub type Line = usize;

pub type Col = usize;

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    line: Line,
    col: Col,
}

impl Point {
    pub const ZERO: Point = Point { line: 0, col: 0 };

    #[inline]
    pub fn new(line: Line, col: Col) -> Self {
        Self { line, col }
    }

    #[inline]
    pub fn line(&self) -> Line {
        self.line
    }

    #[inline]
    pub fn col(&self) -> Col {
        self.col
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Point {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, col) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid position: {s} (expected `<line>:<col>`)"))?;
        Ok(Self::new(line.parse::<usize>()?, col.parse::<usize>()?))
    }
}

impl From<(usize, usize)> for Point {
    #[inline]
    fn from((line, col): (usize, usize)) -> Self {
        Self { line, col }
    }
}

impl From<Point> for (usize, usize) {
    #[inline]
    fn from(point: Point) -> Self {
        (point.line, point.col)
    }
}

impl PartialEq<(usize, usize)> for Point {
    #[inline]
    fn eq(&self, &(line, col): &(usize, usize)) -> bool {
        self.line == line && self.col == col
    }
}

/// A half-open span of document positions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    /// The start of the range (inclusive)
    start: Point,
    /// The end of the range (exclusive)
    end: Point,
}

impl Range {
    #[inline]
    pub fn new(start: impl Into<Point>, end: impl Into<Point>) -> Self {
        let start = start.into();
        let end = end.into();
        assert!(start <= end, "start must be less than end: {} !<= {}", start, end);
        Self { start, end }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn start(&self) -> Point {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Point {
        self.end
    }

    #[inline]
    pub fn contains(&self, pos: Point) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Whether the whole range lies at or before `pos`.
    #[inline]
    pub fn is_before(&self, pos: Point) -> bool {
        self.end <= pos
    }

    #[inline]
    pub fn intersects(&self, other: &Range) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl FromStr for Range {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once("..").ok_or_else(|| {
            anyhow::anyhow!("invalid range: {s} (expected `<line>:<col>..<line>:<col>`)")
        })?;
        Ok(Self::new(start.parse::<Point>()?, end.parse::<Point>()?))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl From<Range> for ops::Range<Point> {
    fn from(range: Range) -> Self {
        range.start..range.end
    }
}

/// One editor edit: replace `range` with `text`.
#[derive(Clone, PartialEq, Eq)]
pub struct TextChange {
    pub range: Range,
    pub text: Cow<'static, str>,
}

impl TextChange {
    pub fn new(range: Range, text: impl Into<Cow<'static, str>>) -> Self {
        Self { range, text: text.into() }
    }

    #[inline]
    pub fn delta(&self) -> RangeDelta {
        to_range_delta(self.range, &self.text)
    }
}

impl fmt::Debug for TextChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} => {:?}", self.range, self.text)
    }
}

/// How positions at or after the end of a replaced range move.
///
/// Replacing `range` with new text shifts every later line by `lines`; positions
/// that sat on the final line of the replaced range additionally shift their
/// column by `cols`. Columns count chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDelta {
    /// End of the replaced range, in pre-edit coordinates.
    end: Point,
    lines: isize,
    cols: isize,
}

impl RangeDelta {
    /// Translate a position at or after the replaced range's end.
    #[inline]
    pub fn translate(&self, pos: Point) -> Point {
        debug_assert!(self.end <= pos, "{pos} precedes the edit end {}", self.end);
        let line = (pos.line() as isize + self.lines).try_into().unwrap();
        let col = if pos.line() == self.end.line() {
            (pos.col() as isize + self.cols).try_into().unwrap()
        } else {
            pos.col()
        };
        Point::new(line, col)
    }

    #[inline]
    pub fn translate_range(&self, range: Range) -> Range {
        Range::new(self.translate(range.start()), self.translate(range.end()))
    }
}

/// Compute the [`RangeDelta`] of replacing `range` with `new_text`.
pub fn to_range_delta(range: Range, new_text: &str) -> RangeDelta {
    let newlines = new_text.bytes().filter(|&b| b == b'\n').count();
    let last_line_len = new_text.rsplit('\n').next().unwrap_or("").chars().count();
    let lines = newlines as isize - (range.end().line() - range.start().line()) as isize;
    let cols = if newlines == 0 {
        (range.start().col() + last_line_len) as isize - range.end().col() as isize
    } else {
        last_line_len as isize - range.end().col() as isize
    };
    RangeDelta { end: range.end(), lines, cols }
}

/// The position reached after consuming `offset` chars of `text` starting from
/// `anchor`. Saturates at the end of `text`.
pub fn position_at_relative(anchor: Point, text: &str, offset: usize) -> Point {
    let mut line = anchor.line();
    let mut col = anchor.col();
    for c in text.chars().take(offset) {
        if c == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    Point::new(line, col)
}
