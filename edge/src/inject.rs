//! Streaming insertion of markup before the closing body tag.

use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Elements whose content is not markup; a closing body tag inside them is text.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "template"];
const LONGEST_RAW_TEXT_NAME: usize = 8;
/// Upper bound on bytes kept between chunks while a tag is undecided:
/// `</template` awaiting the byte after it.
pub const MAX_HOLD_BACK: usize = LONGEST_RAW_TEXT_NAME + 2;

/// Wraps an HTML response body and inserts `snippet` right before the first
/// `</body>` end tag (ASCII case-insensitive) that appears in markup. Tags
/// inside comments, attribute values and raw-text elements are ignored.
/// Without such a tag the body is forwarded unchanged. At most
/// [`MAX_HOLD_BACK`] bytes are buffered.
pub struct InjectBody<B> {
    inner: B,
    snippet: Option<Bytes>,
    scanner: Scanner,
    carry: BytesMut,
    trailers: Option<Frame<Bytes>>,
    inner_done: bool,
}

impl<B> InjectBody<B> {
    pub fn new(inner: B, snippet: impl Into<Bytes>) -> Self {
        InjectBody {
            inner,
            snippet: Some(snippet.into()),
            scanner: Scanner::default(),
            carry: BytesMut::new(),
            trailers: None,
            inner_done: false,
        }
    }

    /// Returns the bytes that can be released after receiving `data`.
    fn push(&mut self, data: Bytes) -> Option<Bytes> {
        let Some(snippet) = self.snippet.as_ref() else {
            return (!data.is_empty()).then_some(data);
        };

        self.carry.extend_from_slice(&data);
        let release = match self.scanner.scan(&self.carry) {
            Scan::Found(pos) => {
                let mut out = BytesMut::with_capacity(self.carry.len() + snippet.len());
                out.extend_from_slice(&self.carry[..pos]);
                out.extend_from_slice(snippet);
                out.extend_from_slice(&self.carry[pos..]);
                self.carry.clear();
                self.snippet = None;
                return Some(out.freeze());
            }
            Scan::HoldFrom(pos) => pos,
            Scan::Consumed => self.carry.len(),
        };

        let out = self.carry.split_to(release).freeze();
        (!out.is_empty()).then_some(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Data,
    /// Inside a tag; `raw` names the raw-text element it opens.
    Tag {
        quote: Option<u8>,
        after_eq: bool,
        raw: Option<&'static str>,
    },
    Comment {
        dashes: u8,
    },
    RawText(&'static str),
}

enum Scan {
    /// The closing body tag starts at this offset.
    Found(usize),
    /// Bytes from this offset cannot be classified until more input arrives.
    HoldFrom(usize),
    Consumed,
}

enum Match {
    Yes,
    No,
    Incomplete,
}

enum Open {
    Incomplete,
    ClosingBody,
    Comment,
    Tag(Option<&'static str>),
    Text,
}

/// Tokenizer state carried across chunks. A scan stops before an undecided
/// `<` without consuming it, so the held bytes are rescanned from that state.
#[derive(Debug)]
struct Scanner {
    state: State,
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner { state: State::Data }
    }
}

impl Scanner {
    fn scan(&mut self, buf: &[u8]) -> Scan {
        let mut i = 0;
        while i < buf.len() {
            let b = buf[i];
            match self.state {
                State::Data if b == b'<' => match open(&buf[i..]) {
                    Open::Incomplete => return Scan::HoldFrom(i),
                    Open::ClosingBody => return Scan::Found(i),
                    Open::Comment => {
                        self.state = State::Comment { dashes: 0 };
                        i += 4;
                        continue;
                    }
                    Open::Tag(raw) => {
                        self.state = State::Tag {
                            quote: None,
                            after_eq: false,
                            raw,
                        }
                    }
                    Open::Text => {}
                },
                State::Data => {}
                State::Tag {
                    quote: Some(q),
                    raw,
                    ..
                } => {
                    if b == q {
                        self.state = State::Tag {
                            quote: None,
                            after_eq: false,
                            raw,
                        };
                    }
                }
                State::Tag {
                    quote: None,
                    after_eq,
                    raw,
                } => {
                    self.state = match b {
                        b'>' => raw.map_or(State::Data, State::RawText),
                        b'"' | b'\'' if after_eq => State::Tag {
                            quote: Some(b),
                            after_eq: false,
                            raw,
                        },
                        b'=' => State::Tag {
                            quote: None,
                            after_eq: true,
                            raw,
                        },
                        b if b.is_ascii_whitespace() => self.state,
                        _ => State::Tag {
                            quote: None,
                            after_eq: false,
                            raw,
                        },
                    };
                }
                State::Comment { dashes } => {
                    self.state = match b {
                        b'-' => State::Comment {
                            dashes: dashes.saturating_add(1),
                        },
                        b'>' if dashes >= 2 => State::Data,
                        _ => State::Comment { dashes: 0 },
                    };
                }
                State::RawText(name) if b == b'<' => match end_tag(&buf[i..], name) {
                    Match::Incomplete => return Scan::HoldFrom(i),
                    Match::Yes => {
                        self.state = State::Tag {
                            quote: None,
                            after_eq: false,
                            raw: None,
                        }
                    }
                    Match::No => {}
                },
                State::RawText(_) => {}
            }
            i += 1;
        }
        Scan::Consumed
    }
}

/// Classifies the markup starting at `input[0] == b'<'` in data state.
fn open(input: &[u8]) -> Open {
    let Some(&next) = input.get(1) else {
        return Open::Incomplete;
    };

    match next {
        b'!' => {
            const COMMENT_OPEN: &[u8] = b"<!--";
            let avail = input.len().min(COMMENT_OPEN.len());
            if input[..avail] != COMMENT_OPEN[..avail] {
                Open::Tag(None)
            } else if avail < COMMENT_OPEN.len() {
                Open::Incomplete
            } else {
                Open::Comment
            }
        }
        b'/' => match end_tag(input, "body") {
            Match::Yes => Open::ClosingBody,
            Match::Incomplete => Open::Incomplete,
            Match::No => Open::Tag(None),
        },
        b if b.is_ascii_alphabetic() => {
            let name_len = input[1..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
                .count();
            let name_end = 1 + name_len;
            if name_end == input.len() && name_len <= LONGEST_RAW_TEXT_NAME {
                return Open::Incomplete;
            }
            let name = &input[1..name_end];
            let raw = RAW_TEXT_ELEMENTS
                .iter()
                .copied()
                .find(|element| element.as_bytes().eq_ignore_ascii_case(name));
            Open::Tag(raw)
        }
        _ => Open::Text,
    }
}

/// Whether `input` starts with the end tag `</name` followed by a delimiter.
fn end_tag(input: &[u8], name: &str) -> Match {
    let name = name.as_bytes();
    let len = 2 + name.len();
    let avail = input.len().min(len);
    let prefix = input[..avail]
        .iter()
        .zip(b"</".iter().chain(name))
        .all(|(a, b)| a.eq_ignore_ascii_case(b));

    match input.get(len) {
        _ if !prefix => Match::No,
        None => Match::Incomplete,
        Some(&b) if b == b'>' || b == b'/' || b.is_ascii_whitespace() => Match::Yes,
        Some(_) => Match::No,
    }
}

impl<B> Body for InjectBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        loop {
            if this.inner_done {
                if !this.carry.is_empty() {
                    let rest = this.carry.split().freeze();
                    return Poll::Ready(Some(Ok(Frame::data(rest))));
                }
                return Poll::Ready(this.trailers.take().map(Ok));
            }

            match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
                None => this.inner_done = true,
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        if let Some(out) = this.push(data) {
                            return Poll::Ready(Some(Ok(Frame::data(out))));
                        }
                    }
                    // Trailers are the last frame; flush held bytes first.
                    Err(frame) => {
                        this.trailers = Some(frame);
                        this.inner_done = true;
                    }
                },
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner_done && self.carry.is_empty() && self.trailers.is_none()
    }
}
