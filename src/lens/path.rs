use std::borrow::Cow;
use std::fmt;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Map key.
    Key(String),
    /// List index (a purely numeric token).
    Index(usize),
}

impl Segment {
    fn from_token(token: &str) -> Segment {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse() {
                return Segment::Index(index);
            }
        }
        Segment::Key(token.to_string())
    }

    /// The segment as a map key. Indices are stringified.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Segment::Key(key) => Cow::Borrowed(key),
            Segment::Index(i) => Cow::Owned(i.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A tokenized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Split on `.`, `[` and `]`. Empty tokens are dropped, so `a[0]`,
    /// `a.0` and `a[0].` all yield `[a, 0]`.
    pub fn parse(path: impl ToString) -> Path {
        let raw = path.to_string();
        let segments = raw
            .split(['.', '[', ']'])
            .filter(|token| !token.is_empty())
            .map(Segment::from_token)
            .collect();
        Path { segments }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Path {
        Path { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment.
    pub fn child(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path { segments }
    }

    /// Split off the last segment.
    pub fn split_last(&self) -> Option<(Path, &Segment)> {
        self.segments
            .split_last()
            .map(|(last, parent)| (Path::from_segments(parent.to_vec()), last))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Index(idx) => write!(f, "[{idx}]")?,
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}
