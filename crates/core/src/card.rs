use serde::{Deserialize, Serialize};

/// A structured, sectioned chat payload. Replies carry either plain text or
/// one of these, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub theme: String,
    pub sections: Vec<CardSection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSection {
    pub id: u32,
    pub elements: Vec<CardElement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub text: String,
}

impl CardElement {
    pub fn text(text: impl Into<String>) -> Self {
        Self { element_type: "text".to_string(), text: text.into() }
    }
}

pub struct CardBuilder {
    title: String,
    theme: String,
    sections: Vec<CardSection>,
}

impl CardBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), theme: "modern-inline".to_string(), sections: Vec::new() }
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        let id = self.sections.len() as u32 + 1;
        self.sections.push(CardSection { id, elements: builder.elements });
        self
    }

    pub fn build(self) -> Card {
        Card { title: self.title, theme: self.theme, sections: self.sections }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    elements: Vec<CardElement>,
}

impl SectionBuilder {
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(CardElement::text(text));
        self
    }
}
