//! Tag-level XML extraction for SOAP bodies and device description documents.
//!
//! TR-064 devices answer with small, flat documents, so this module does not
//! parse XML. It locates elements by tag name, either inside a fully buffered
//! string ([`extract_all`]) or while reading a live byte stream
//! ([`TagScanner`], [`extract_streaming`], [`extract_single_streaming`]).
//!
//! The streaming scanner yields one [`Element`] per tag it encounters. Two
//! independent consumers read the same sequence of events:
//!
//! - [`Output`] slots requested by the caller, filled by the first element
//!   whose tag matches the slot name (ASCII case-insensitive).
//! - A [`TagObserver`], typically the authentication context, which sees
//!   every element and picks out the control tags it cares about.
//!
//! # Example
//!
//! ```
//! use tr064::xml::{extract_all, extract_streaming, Output, SliceSource, TagScanner};
//!
//! assert_eq!(extract_all("<Foo>bar</Foo>", "foo"), Some("bar"));
//!
//! let body = b"<NewSerialNumber>AB12</NewSerialNumber><NewUpTime>42</NewUpTime>";
//! let mut scanner = TagScanner::new(SliceSource::new(body));
//! let mut outputs = [Output::new("NewUpTime")];
//! let matched = extract_streaming(&mut scanner, &mut outputs, &mut ()).unwrap();
//!
//! assert_eq!(matched, 1);
//! assert_eq!(outputs[0].value(), Some("42"));
//! ```

use alloc::borrow::Cow;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::convert::Infallible;

use log::{trace, warn};

/// Longest tag (name plus attributes) kept by the streaming scanner, in bytes.
pub const MAX_TAG_LEN: usize = 256;

/// Longest element text kept by the streaming scanner, in bytes.
pub const MAX_TEXT_LEN: usize = 16 * 1024;

/// Consecutive "no data yet" reads tolerated before a stream is considered exhausted.
pub const DEFAULT_MAX_IDLE_READS: u32 = 40;

/// Result of pulling one byte out of a [`ByteSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Byte {
    /// A byte of the document.
    Data(u8),
    /// No data arrived within the source's read timeout. More may follow.
    Idle,
    /// The document ended or the connection closed.
    End,
}

/// A byte-oriented input the streaming extractor can read from.
pub trait ByteSource {
    /// Error returned when the source fails for a reason other than running dry.
    type Error;

    /// Returns the next byte, an idle marker, or the end of the input.
    fn next_byte(&mut self) -> Result<Byte, Self::Error>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    type Error = S::Error;

    fn next_byte(&mut self) -> Result<Byte, Self::Error> {
        (**self).next_byte()
    }
}

/// A [`ByteSource`] over an in-memory buffer. Never idles.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Wraps a buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the part of the buffer not read yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    type Error = Infallible;

    fn next_byte(&mut self) -> Result<Byte, Self::Error> {
        match self.data.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(Byte::Data(byte))
            }
            None => Ok(Byte::End),
        }
    }
}

/// One tag and the text that follows it, up to the next `<`.
///
/// Closing tags (`/Name`), processing instructions (`?xml`) and comments
/// (`!--`) are reported as well; their names can never collide with a wanted
/// element name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Tag name without attributes or the self-closing slash.
    pub tag: String,
    /// Unescaped text following the tag.
    pub text: String,
}

impl Element {
    /// Compares the tag name against `name`, ignoring ASCII case.
    pub fn is_named(&self, name: &str) -> bool {
        self.tag.eq_ignore_ascii_case(name)
    }
}

/// Receives every element seen during a streaming scan.
pub trait TagObserver {
    /// Called once per element, in document order.
    fn observe(&mut self, tag: &str, value: &str);
}

impl TagObserver for () {
    fn observe(&mut self, _tag: &str, _value: &str) {}
}

impl<O: TagObserver + ?Sized> TagObserver for &mut O {
    fn observe(&mut self, tag: &str, value: &str) {
        (**self).observe(tag, value)
    }
}

/// A named output slot filled from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    name: String,
    value: Option<String>,
}

impl Output {
    /// Creates an empty slot for the element called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the extracted value, if the element was found.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Moves the extracted value out of the slot.
    pub fn take(&mut self) -> Option<String> {
        self.value.take()
    }

    pub fn is_filled(&self) -> bool {
        self.value.is_some()
    }

    /// Empties the slot so it can be filled by another response.
    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Fills the slot from `element` if the names match and the slot is still
    /// empty. Returns whether the slot was filled.
    fn offer(&mut self, element: &Element) -> bool {
        if self.value.is_some() || self.name.is_empty() || !element.is_named(&self.name) {
            return false;
        }
        trace!("found output {} => {}", self.name, element.text);
        self.value = Some(element.text.clone());
        true
    }
}

/// Incremental scanner turning a [`ByteSource`] into a sequence of [`Element`]s.
///
/// The scanner keeps its position between calls, so several extractions can
/// run one after another over the same stream.
#[derive(Debug)]
pub struct TagScanner<S> {
    source: S,
    max_idle_reads: u32,
    at_tag_start: bool,
    finished: bool,
}

impl<S: ByteSource> TagScanner<S> {
    pub fn new(source: S) -> Self {
        Self { source, max_idle_reads: DEFAULT_MAX_IDLE_READS, at_tag_start: false, finished: false }
    }

    /// Sets how many consecutive idle reads end the stream.
    pub fn with_max_idle_reads(mut self, max_idle_reads: u32) -> Self {
        self.max_idle_reads = max_idle_reads;
        self
    }

    /// Returns true once the source reported its end or stayed idle too long.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn next_raw(&mut self) -> Result<Option<u8>, S::Error> {
        let mut idle = 0;
        loop {
            match self.source.next_byte()? {
                Byte::Data(byte) => return Ok(Some(byte)),
                Byte::End => {
                    self.finished = true;
                    return Ok(None);
                }
                Byte::Idle => {
                    idle += 1;
                    if idle > self.max_idle_reads {
                        trace!("no data after {} idle reads, treating stream as ended", idle - 1);
                        self.finished = true;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Reads the next element, or `None` when the stream is exhausted.
    pub fn next_element(&mut self) -> Result<Option<Element>, S::Error> {
        if self.finished {
            return Ok(None);
        }

        if !self.at_tag_start {
            loop {
                match self.next_raw()? {
                    Some(b'<') => break,
                    Some(_) => {}
                    None => return Ok(None),
                }
            }
        }
        self.at_tag_start = false;

        let mut raw_tag = Vec::new();
        let mut truncated = false;
        loop {
            match self.next_raw()? {
                Some(b'>') => break,
                Some(byte) => push_bounded(&mut raw_tag, byte, MAX_TAG_LEN, &mut truncated),
                // An unterminated tag at the end of the stream carries nothing usable.
                None => return Ok(None),
            }
        }
        if truncated {
            warn!("tag longer than {} bytes truncated", MAX_TAG_LEN);
        }

        let mut raw_text = Vec::new();
        let mut truncated = false;
        loop {
            match self.next_raw()? {
                Some(b'<') => {
                    self.at_tag_start = true;
                    break;
                }
                Some(byte) => push_bounded(&mut raw_text, byte, MAX_TEXT_LEN, &mut truncated),
                None => break,
            }
        }
        if truncated {
            warn!("element text longer than {} bytes truncated", MAX_TEXT_LEN);
        }

        let raw_tag = String::from_utf8_lossy(&raw_tag);
        let self_closing = raw_tag.ends_with('/');
        let tag = tag_name(&raw_tag);
        let text = if self_closing {
            String::new()
        } else {
            unescape(&String::from_utf8_lossy(&raw_text)).into_owned()
        };

        Ok(Some(Element { tag: String::from(tag), text }))
    }
}

fn push_bounded(buffer: &mut Vec<u8>, byte: u8, limit: usize, truncated: &mut bool) {
    if buffer.len() < limit {
        buffer.push(byte);
    } else {
        *truncated = true;
    }
}

fn tag_name(raw_tag: &str) -> &str {
    let name = raw_tag.split(|c: char| c.is_ascii_whitespace()).next().unwrap_or("");
    if name.len() > 1 { name.trim_end_matches('/') } else { name }
}

/// Scans the rest of the stream, filling `outputs` and reporting every element
/// to `observer`. Returns the number of slots filled.
///
/// Each slot takes the first matching element; later duplicates are ignored.
pub fn extract_streaming<S, O>(
    scanner: &mut TagScanner<S>,
    outputs: &mut [Output],
    observer: &mut O,
) -> Result<usize, S::Error>
where
    S: ByteSource,
    O: TagObserver + ?Sized,
{
    let mut matched = 0;
    while let Some(element) = scanner.next_element()? {
        observer.observe(&element.tag, &element.text);
        for output in outputs.iter_mut() {
            if output.offer(&element) {
                matched += 1;
            }
        }
    }
    Ok(matched)
}

/// Advances the stream to the first element named `tag` and returns its text.
///
/// Stops right after the match so the rest of the stream can be scanned
/// further; returns `None` if the stream ends first.
pub fn extract_single_streaming<S: ByteSource>(
    scanner: &mut TagScanner<S>,
    tag: &str,
) -> Result<Option<String>, S::Error> {
    while let Some(element) = scanner.next_element()? {
        if element.is_named(tag) {
            trace!("found tag {} => {}", element.tag, element.text);
            return Ok(Some(element.text));
        }
    }
    Ok(None)
}

/// Returns the content between the first `<tag>` and the following `</tag>`.
///
/// Exact case is tried first, then an ASCII case-insensitive match. Both
/// delimiters must be present and the closing tag must follow the opening one.
pub fn extract_all<'a>(source: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    locate(source, &open, &close, false).or_else(|| locate(source, &open, &close, true))
}

fn locate<'a>(source: &'a str, open: &str, close: &str, ignore_case: bool) -> Option<&'a str> {
    let start = find(source, open, 0, ignore_case)? + open.len();
    let end = find(source, close, start, ignore_case)?;
    source.get(start..end)
}

/// Finds `needle` in `haystack` at or after byte offset `from`.
fn find(haystack: &str, needle: &str, from: usize, ignore_case: bool) -> Option<usize> {
    let rest = haystack.get(from..)?;
    if !ignore_case {
        return rest.find(needle).map(|index| index + from);
    }
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Some(from);
    }
    rest.as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|index| index + from)
}

/// Replaces the predefined XML entities in element text.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

/// Escapes text for use as element content in a request.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn scan_all(input: &[u8]) -> Vec<Element> {
        let mut scanner = TagScanner::new(SliceSource::new(input));
        let mut elements = Vec::new();
        while let Some(element) = scanner.next_element().unwrap() {
            elements.push(element);
        }
        elements
    }

    /// Replays a script of bytes and idle reads.
    struct ScriptedSource {
        script: Vec<Byte>,
        pos: usize,
    }

    impl ByteSource for ScriptedSource {
        type Error = ();

        fn next_byte(&mut self) -> Result<Byte, ()> {
            let byte = self.script.get(self.pos).copied().unwrap_or(Byte::End);
            self.pos += 1;
            Ok(byte)
        }
    }

    #[test]
    fn test_extract_all_exact_case() {
        assert_eq!(extract_all("<a><Foo>bar</Foo></a>", "Foo"), Some("bar"));
    }

    #[test]
    fn test_extract_all_case_insensitive_fallback() {
        assert_eq!(extract_all("<Foo>bar</Foo>", "foo"), Some("bar"));
        assert_eq!(extract_all("<FOO>bar</foo>", "Foo"), Some("bar"));
    }

    #[test]
    fn test_extract_all_status_lowercases_to_sentinel() {
        let status = extract_all("<Status>Unauthenticated</Status>", "Status").unwrap();
        assert_eq!(status.to_ascii_lowercase(), "unauthenticated");
    }

    #[test]
    fn test_extract_all_requires_both_delimiters() {
        assert_eq!(extract_all("<Foo>bar", "Foo"), None);
        assert_eq!(extract_all("bar</Foo>", "Foo"), None);
        assert_eq!(extract_all("", "Foo"), None);
    }

    #[test]
    fn test_extract_all_requires_ordered_delimiters() {
        assert_eq!(extract_all("</Foo>x<Foo>", "Foo"), None);
    }

    #[test]
    fn test_extract_all_at_offset_zero() {
        // The opening tag at index 0 must count as found.
        assert_eq!(extract_all("<Nonce>F00D</Nonce>", "Nonce"), Some("F00D"));
    }

    #[test]
    fn test_extract_all_empty_content() {
        assert_eq!(extract_all("<Foo></Foo>", "Foo"), Some(""));
    }

    #[test]
    fn test_scanner_yields_every_tag() {
        let elements = scan_all(b"<?xml version=\"1.0\"?><a><b>1</b><c>2</c></a>");
        let tags: Vec<&str> = elements.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["?xml", "a", "b", "/b", "c", "/c", "/a"]);
        assert_eq!(elements[2].text, "1");
        assert_eq!(elements[4].text, "2");
    }

    #[test]
    fn test_scanner_does_not_skip_after_empty_text() {
        // A container tag with no text must not swallow the next tag.
        let elements = scan_all(b"<s:Header><h:Challenge xmlns:h=\"x\"><Nonce>N</Nonce>");
        assert_eq!(elements[1].tag, "h:Challenge");
        assert_eq!(elements[2].tag, "Nonce");
        assert_eq!(elements[2].text, "N");
    }

    #[test]
    fn test_scanner_strips_attributes_and_self_closing() {
        let elements = scan_all(b"<u:GetInfoResponse xmlns:u=\"urn:x\"><Empty/>junk<Next>v</Next>");
        assert_eq!(elements[0].tag, "u:GetInfoResponse");
        assert_eq!(elements[1].tag, "Empty");
        assert_eq!(elements[1].text, "");
        assert_eq!(elements[2].tag, "Next");
    }

    #[test]
    fn test_scanner_unescapes_text() {
        let elements = scan_all(b"<Name>Tom &amp; Jerry &lt;3</Name>");
        assert_eq!(elements[0].text, "Tom & Jerry <3");
    }

    #[test]
    fn test_scanner_truncates_oversized_text() {
        let mut input = Vec::from(&b"<Big>"[..]);
        input.extend(core::iter::repeat_n(b'x', MAX_TEXT_LEN + 100));
        input.extend_from_slice(b"</Big><After>ok</After>");

        let elements = scan_all(&input);
        assert_eq!(elements[0].text.len(), MAX_TEXT_LEN);
        assert_eq!(elements[2].tag, "After");
        assert_eq!(elements[2].text, "ok");
    }

    #[test]
    fn test_scanner_tolerates_idle_gaps() {
        let mut script = vec![Byte::Idle; 5];
        script.extend(b"<A>1</A>".iter().map(|&b| Byte::Data(b)));
        let mut scanner = TagScanner::new(ScriptedSource { script, pos: 0 });
        let mut outputs = [Output::new("A")];

        assert_eq!(extract_streaming(&mut scanner, &mut outputs, &mut ()).unwrap(), 1);
        assert_eq!(outputs[0].value(), Some("1"));
    }

    #[test]
    fn test_scanner_gives_up_after_idle_budget() {
        let mut script = vec![Byte::Idle; 11];
        script.extend(b"<A>1</A>".iter().map(|&b| Byte::Data(b)));
        let mut scanner = TagScanner::new(ScriptedSource { script, pos: 0 }).with_max_idle_reads(10);

        assert_eq!(scanner.next_element().unwrap(), None);
        assert!(scanner.is_finished());
    }

    #[test]
    fn test_extract_streaming_first_occurrence_wins() {
        let body = b"<Value>first</Value><value>second</value>";
        let mut scanner = TagScanner::new(SliceSource::new(body));
        let mut outputs = [Output::new("VALUE")];

        assert_eq!(extract_streaming(&mut scanner, &mut outputs, &mut ()).unwrap(), 1);
        assert_eq!(outputs[0].value(), Some("first"));
    }

    #[test]
    fn test_extract_streaming_reports_all_elements_to_observer() {
        #[derive(Default)]
        struct Recorder(Vec<(String, String)>);

        impl TagObserver for Recorder {
            fn observe(&mut self, tag: &str, value: &str) {
                if !tag.starts_with('/') {
                    self.0.push((tag.into(), value.into()));
                }
            }
        }

        let body = b"<Nonce>N1</Nonce><Realm>R</Realm><NewX>7</NewX>";
        let mut scanner = TagScanner::new(SliceSource::new(body));
        let mut outputs = [Output::new("NewX"), Output::new("NewMissing")];
        let mut recorder = Recorder::default();

        let matched = extract_streaming(&mut scanner, &mut outputs, &mut recorder).unwrap();

        assert_eq!(matched, 1);
        assert!(!outputs[1].is_filled());
        assert_eq!(recorder.0.len(), 3);
        assert_eq!(recorder.0[0], ("Nonce".into(), "N1".into()));
    }

    #[test]
    fn test_extract_single_streaming_resumes() {
        let body = b"<service><serviceType>A</serviceType><controlURL>/a</controlURL></service>\
                     <service><serviceType>B</serviceType><controlURL>/b</controlURL></service>";
        let mut scanner = TagScanner::new(SliceSource::new(body));

        assert_eq!(extract_single_streaming(&mut scanner, "serviceType").unwrap().as_deref(), Some("A"));
        assert_eq!(extract_single_streaming(&mut scanner, "controlURL").unwrap().as_deref(), Some("/a"));
        assert_eq!(extract_single_streaming(&mut scanner, "serviceType").unwrap().as_deref(), Some("B"));
        assert_eq!(extract_single_streaming(&mut scanner, "controlURL").unwrap().as_deref(), Some("/b"));
        assert_eq!(extract_single_streaming(&mut scanner, "serviceType").unwrap(), None);
    }

    #[test]
    fn test_escape_roundtrip_special_characters() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
        assert_eq!(unescape(&escape("x&y<z>\"")), "x&y<z>\"");
    }
}
