//! E-utilities `efetch` XML parsing.

use crate::models::LiteratureRecord;
use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Default)]
struct ArticleBuilder {
    id: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    current_part: Option<String>,
    pub_year: Option<String>,
    medline_date: Option<String>,
}

impl ArticleBuilder {
    fn finish(self) -> LiteratureRecord {
        let id = self.id.map(|id| id.trim().to_string()).unwrap_or_default();
        let abstract_text = self
            .abstract_parts
            .iter()
            .map(|part| collapse_whitespace(part))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let year = self
            .pub_year
            .as_deref()
            .and_then(|y| y.trim().parse().ok())
            .or_else(|| self.medline_date.as_deref().and_then(leading_year))
            .or_else(|| leading_year(&id));

        LiteratureRecord {
            title: collapse_whitespace(&self.title),
            abstract_text,
            year,
            id,
        }
    }
}

/// Parses a `PubmedArticleSet` document into records, in document order.
///
/// Abstract segments (structured abstracts split into several `AbstractText`
/// elements) are joined with a single space; inline markup inside titles and
/// abstracts is flattened to its text. The year comes from `PubDate/Year`,
/// then the leading digits of `PubDate/MedlineDate`, then the leading four
/// digits of the id.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the document is not well-formed XML.
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<LiteratureRecord>> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut records = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| parse_error(&reader, &e))?;
        match event {
            Event::Start(start) => {
                let name = start.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => current = Some(ArticleBuilder::default()),
                    b"AbstractText" => {
                        if let Some(article) = current.as_mut() {
                            article.current_part = Some(String::new());
                        }
                    },
                    _ => {},
                }
                path.push(name);
            },
            Event::End(end) => {
                match end.name().as_ref() {
                    b"PubmedArticle" => {
                        if let Some(article) = current.take() {
                            records.push(article.finish());
                        }
                    },
                    b"AbstractText" => {
                        if let Some(article) = current.as_mut() {
                            if let Some(part) = article.current_part.take() {
                                article.abstract_parts.push(part);
                            }
                        }
                    },
                    _ => {},
                }
                path.pop();
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| parse_error(&reader, &e))?;
                if let Some(article) = current.as_mut() {
                    collect_text(article, &path, &text);
                }
            },
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data);
                if let Some(article) = current.as_mut() {
                    collect_text(article, &path, &text);
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    Ok(records)
}

fn collect_text(article: &mut ArticleBuilder, path: &[Vec<u8>], text: &str) {
    let Some(last) = path.last() else {
        return;
    };
    let parent = path.len().checked_sub(2).and_then(|i| path.get(i));
    let within = |name: &[u8]| path.iter().any(|p| p.as_slice() == name);

    if last.as_slice() == b"PMID" && article.id.is_none() {
        article.id = Some(text.to_string());
    } else if within(b"ArticleTitle") {
        article.title.push_str(text);
    } else if within(b"AbstractText") {
        if let Some(part) = article.current_part.as_mut() {
            part.push_str(text);
        }
    } else if parent.is_some_and(|p| p.as_slice() == b"PubDate") {
        match last.as_slice() {
            b"Year" if article.pub_year.is_none() => article.pub_year = Some(text.to_string()),
            b"MedlineDate" if article.medline_date.is_none() => {
                article.medline_date = Some(text.to_string());
            },
            _ => {},
        }
    }
}

/// Parses the first four characters as a year when they are all digits.
fn leading_year(raw: &str) -> Option<i32> {
    let head = raw.trim().get(..4)?;
    if head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse().ok()
    } else {
        None
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_error(reader: &Reader<&[u8]>, e: &impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "parse_efetch_xml".to_string(),
        cause: format!("at byte {}: {e}", reader.buffer_position()),
    }
}
