// Sitemap document classification

use crate::error::{Result, ScanError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// The classified shape of one fetched sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapNode {
    /// A `<sitemapindex>` listing child sitemap locations, in document order
    Index { children: Vec<String> },
    /// A `<urlset>`; the leaf value is the reference the document was fetched from
    Leaf { url: String },
    /// Well-formed, but neither an index nor a urlset
    Unrecognized,
}

/// Turns raw document bytes into a [`SitemapNode`].
pub trait DocumentClassifier: Send + Sync {
    fn classify(&self, reference: &str, bytes: &[u8]) -> Result<SitemapNode>;
}

/// Classifier for the sitemaps.org XML format.
///
/// Only the local part of element names is inspected, so documents with a
/// missing, default or prefixed namespace are all handled alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlClassifier;

impl DocumentClassifier for XmlClassifier {
    fn classify(&self, reference: &str, bytes: &[u8]) -> Result<SitemapNode> {
        classify(reference, bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RootKind {
    Index,
    Urlset,
    Other,
}

#[derive(Default)]
struct Walker {
    depth: usize,
    root: Option<RootKind>,
    root_closed: bool,
    in_sitemap: bool,
    in_loc: bool,
    loc_text: String,
    current_loc: Option<String>,
    children: Vec<String>,
}

impl Walker {
    fn open(&mut self, element: &BytesStart) -> Result<()> {
        if self.root_closed {
            return Err(ScanError::MalformedDocument(
                "junk after document element".to_string(),
            ));
        }

        self.depth += 1;
        let name = element.local_name();
        let name = name.as_ref();

        match self.depth {
            1 => {
                self.root = Some(match name {
                    b"sitemapindex" => RootKind::Index,
                    b"urlset" => RootKind::Urlset,
                    _ => RootKind::Other,
                });
            }
            2 if self.root == Some(RootKind::Index) && name == b"sitemap" => {
                self.in_sitemap = true;
                self.current_loc = None;
            }
            3 if self.in_sitemap && name == b"loc" && self.current_loc.is_none() => {
                self.in_loc = true;
                self.loc_text.clear();
            }
            _ => {}
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.depth {
            0 => {
                return Err(ScanError::MalformedDocument(
                    "unmatched closing tag".to_string(),
                ));
            }
            3 if self.in_loc => {
                self.in_loc = false;
                self.current_loc = Some(self.loc_text.trim().to_string());
            }
            2 if self.in_sitemap => {
                self.in_sitemap = false;
                // <sitemap> entries without a usable <loc> are skipped
                if let Some(loc) = self.current_loc.take()
                    && !loc.is_empty()
                {
                    self.children.push(loc);
                }
            }
            _ => {}
        }

        self.depth -= 1;
        if self.depth == 0 {
            self.root_closed = true;
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if self.in_loc {
            self.loc_text.push_str(text);
        } else if self.depth == 0 && !text.trim().is_empty() {
            return Err(ScanError::MalformedDocument(
                "text outside of the document element".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(self, reference: &str) -> Result<SitemapNode> {
        if self.depth > 0 {
            return Err(ScanError::MalformedDocument(
                "unexpected end of document".to_string(),
            ));
        }

        match self.root {
            None => Err(ScanError::MalformedDocument(
                "no document element found".to_string(),
            )),
            Some(RootKind::Index) => Ok(SitemapNode::Index {
                children: self.children,
            }),
            Some(RootKind::Urlset) => Ok(SitemapNode::Leaf {
                url: reference.to_string(),
            }),
            Some(RootKind::Other) => Ok(SitemapNode::Unrecognized),
        }
    }
}

/// Classify a sitemap document fetched from `reference`.
pub fn classify(reference: &str, bytes: &[u8]) -> Result<SitemapNode> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut walker = Walker::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => walker.open(e)?,
            Ok(Event::Empty(ref e)) => {
                walker.open(e)?;
                walker.close()?;
            }
            Ok(Event::End(_)) => walker.close()?,
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ScanError::MalformedDocument(err.to_string()))?;
                walker.text(&text)?;
            }
            Ok(Event::CData(ref e)) => {
                walker.text(&String::from_utf8_lossy(e))?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions and doctypes
            Ok(_) => {}
            Err(e) => {
                return Err(ScanError::MalformedDocument(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    walker.finish(reference)
}
