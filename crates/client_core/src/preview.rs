//! Tokenizer for the serialized entry text returned by the backend preview
//! operation. The raw text is split into typed spans; markup is only ever
//! attached to escaped text, so stored content cannot smuggle structural
//! markup into the rendered preview.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    TypeHeader,
    CiteKey,
    FieldName,
    FieldValue,
    Comment,
    Text,
}

impl SpanKind {
    fn css_class(self) -> Option<&'static str> {
        match self {
            Self::TypeHeader => Some("bib-type"),
            Self::CiteKey => Some("bib-key"),
            Self::FieldName => Some("bib-field"),
            Self::FieldValue => Some("bib-value"),
            Self::Comment => Some("bib-comment"),
            Self::Text => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSpan {
    pub kind: SpanKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    pub raw: String,
    pub spans: Vec<PreviewSpan>,
}

impl PreviewDocument {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            spans: tokenize(raw),
        }
    }

    /// Display markup with every raw fragment escaped before tagging.
    pub fn to_markup(&self) -> String {
        let mut markup = String::with_capacity(self.raw.len());
        for span in &self.spans {
            let escaped = escape_markup(&span.text);
            match span.kind.css_class() {
                Some(class) => {
                    markup.push_str("<span class=\"");
                    markup.push_str(class);
                    markup.push_str("\">");
                    markup.push_str(&escaped);
                    markup.push_str("</span>");
                }
                None => markup.push_str(&escaped),
            }
        }
        markup
    }
}

pub fn escape_markup(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn tokenize(raw: &str) -> Vec<PreviewSpan> {
    let mut spans = Vec::new();
    let mut saw_header = false;
    let lines: Vec<&str> = raw.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    for (index, line) in lines.iter().enumerate() {
        if line.starts_with('%') {
            push_span(&mut spans, SpanKind::Comment, line);
        } else if !saw_header && tokenize_header(&mut spans, line) {
            saw_header = true;
        } else if !tokenize_field(&mut spans, line) {
            push_span(&mut spans, SpanKind::Text, line);
        }
        if index != last {
            push_span(&mut spans, SpanKind::Text, "\n");
        }
    }
    spans
}

/// `@type{key,` at the start of a line.
fn tokenize_header(spans: &mut Vec<PreviewSpan>, line: &str) -> bool {
    if !line.starts_with('@') {
        return false;
    }
    let Some(brace) = line.find('{') else {
        return false;
    };
    if brace < 2 || !line[1..brace].chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let Some(comma) = line[brace..].find(',').map(|offset| brace + offset) else {
        return false;
    };
    if comma == brace + 1 {
        return false;
    }
    push_span(spans, SpanKind::TypeHeader, &line[..brace]);
    push_span(spans, SpanKind::Text, "{");
    push_span(spans, SpanKind::CiteKey, &line[brace + 1..comma]);
    push_span(spans, SpanKind::Text, &line[comma..]);
    true
}

/// `  name = {value},` with an optional trailing comma.
fn tokenize_field(spans: &mut Vec<PreviewSpan>, line: &str) -> bool {
    let Some(eq) = line.find('=') else {
        return false;
    };
    let before = &line[..eq];
    let name = before.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    let Some(open) = line[eq..].find('{').map(|offset| eq + offset) else {
        return false;
    };
    if !line[eq + 1..open].trim().is_empty() {
        return false;
    }
    let Some(close) = line.rfind('}') else {
        return false;
    };
    if close < open {
        return false;
    }
    let tail = line[close + 1..].trim();
    if !tail.is_empty() && tail != "," {
        return false;
    }
    let name_start = before.len() - before.trim_start().len();
    push_span(spans, SpanKind::Text, &line[..name_start]);
    push_span(spans, SpanKind::FieldName, name);
    push_span(spans, SpanKind::Text, &line[name_start + name.len()..open + 1]);
    push_span(spans, SpanKind::FieldValue, &line[open + 1..close]);
    push_span(spans, SpanKind::Text, &line[close..]);
    true
}

fn push_span(spans: &mut Vec<PreviewSpan>, kind: SpanKind, text: &str) {
    if text.is_empty() {
        return;
    }
    spans.push(PreviewSpan {
        kind,
        text: text.to_string(),
    });
}
