//! Prompt assembly.
//!
//! A [`PromptTemplate`] is parsed once from configuration into literal text
//! and three placeholders:
//!
//! | Placeholder | Filled with |
//! |-------------|-------------|
//! | `{session_context}` | [`SessionContext::render`] of the prior turns |
//! | `{context}` | retrieved document contents joined by a blank line |
//! | `{question}` | the current user question |
//!
//! Rendering is a single pass over the parsed segments, so placeholder text
//! that appears inside a document or question is emitted verbatim. Any other
//! `{...}` sequence in the template is literal text.

use anyhow::{bail, Result};

use crate::models::{PromptPayload, RetrievedDocument, SessionContext};

/// The "SFCシラバスアドバイザー" system instruction.
pub const DEFAULT_TEMPLATE: &str = "\
あなたは、「SFCシラバスアドバイザー」というチャットボットです。
背景情報を参考に、質問に対して慶應SFCの人間になりきって、質問に回答してくだい。

慶應SFCに全く関係のない質問と思われる質問に関しては、「慶應SFCに関係することについて聞いてください」と答えてください。

以下の背景情報を参照してください。情報がなければ、その内容については言及しないでください。

# 文脈情報
{session_context}

# 背景情報
{context}

# 質問
{question}";

/// Separator between retrieved documents in the `{context}` section.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    SessionContext,
    Context,
    Question,
}

impl Slot {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "session_context" => Some(Slot::SessionContext),
            "context" => Some(Slot::Context),
            "question" => Some(Slot::Question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `template`. It must reference both `{context}` and `{question}`.
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let slot = after
                .find('}')
                .and_then(|close| Slot::parse(&after[..close]).map(|s| (s, close)));
            match slot {
                Some((slot, close)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let has = |slot: Slot| segments.iter().any(|s| *s == Segment::Slot(slot));
        if !has(Slot::Context) {
            bail!("prompt template must contain a {{context}} placeholder");
        }
        if !has(Slot::Question) {
            bail!("prompt template must contain a {{question}} placeholder");
        }

        Ok(Self { segments })
    }

    /// Substitute a payload into the template.
    pub fn render(&self, payload: &PromptPayload) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Slot::SessionContext) => out.push_str(&payload.session_context),
                Segment::Slot(Slot::Context) => out.push_str(&payload.context),
                Segment::Slot(Slot::Question) => out.push_str(&payload.question),
            }
        }
        out
    }

    /// Build the payload for one turn and render it.
    pub fn assemble(
        &self,
        session_context: &SessionContext,
        documents: &[RetrievedDocument],
        question: &str,
    ) -> String {
        self.render(&build_payload(session_context, documents, question))
    }
}

/// Collect the three template inputs for a turn.
pub fn build_payload(
    session_context: &SessionContext,
    documents: &[RetrievedDocument],
    question: &str,
) -> PromptPayload {
    let context = documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR);

    PromptPayload {
        session_context: session_context.render(),
        context,
        question: question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, Message};

    fn doc(content: &str, url: &str) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source_url: url.to_string(),
                extra: Default::default(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn renders_sections_in_template_order() {
        let tpl = PromptTemplate::new("ctx:{session_context}|bg:{context}|q:{question}").unwrap();
        let session = SessionContext::from_messages(&[Message::user("prev")]);
        let out = tpl.assemble(&session, &[doc("A", "u1"), doc("B", "u2")], "why?");
        assert_eq!(out, "ctx:user: prev|bg:A\n\nB|q:why?");
    }

    #[test]
    fn empty_retrieval_leaves_background_empty() {
        let tpl = PromptTemplate::new("[{context}]{question}").unwrap();
        let out = tpl.assemble(&SessionContext::default(), &[], "q");
        assert_eq!(out, "[]q");
    }

    #[test]
    fn placeholders_in_values_are_not_expanded() {
        let tpl = PromptTemplate::new("{context}/{question}").unwrap();
        let out = tpl.assemble(&SessionContext::default(), &[doc("{question}", "u")], "Q");
        assert_eq!(out, "{question}/Q");
    }

    #[test]
    fn unknown_braces_are_literal() {
        let tpl = PromptTemplate::new("{json} {context} {question} {").unwrap();
        let out = tpl.assemble(&SessionContext::default(), &[doc("c", "u")], "q");
        assert_eq!(out, "{json} c q {");
    }

    #[test]
    fn missing_context_placeholder_rejected() {
        let err = PromptTemplate::new("{question}").unwrap_err();
        assert!(err.to_string().contains("{context}"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let tpl = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        let session = SessionContext::from_messages(&[
            Message::user("授業について"),
            Message::assistant("はい"),
        ]);
        let docs = vec![doc("環境情報学部", "u1"), doc("総合政策学部", "u2")];
        let a = tpl.assemble(&session, &docs, "慶應SFCの良さは何ですか？");
        let b = tpl.assemble(&session, &docs, "慶應SFCの良さは何ですか？");
        assert_eq!(a, b);
        assert!(a.contains("環境情報学部\n\n総合政策学部"));
        assert!(a.ends_with("# 質問\n慶應SFCの良さは何ですか？"));
        assert!(a.contains("# 文脈情報\nuser: 授業について\nassistant: はい"));
    }
}
