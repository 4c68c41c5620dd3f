//! Argument accumulation for one open marker.

use crate::core::{
    error::{Result, SpgmError},
    i18n::Translations,
    item::Item,
    location::{DefinitionKind, Location},
};

/// An item whose end marker has not been seen yet.
///
/// Arguments are pushed by position: 0 is the name, 1 the value, then
/// alternating language tag and translation. `lang: "text"` selects the
/// language with a colon instead of a position.
#[derive(Debug)]
pub struct PendingItem {
    location: Location,
    name: Option<String>,
    value: Option<String>,
    translations: Translations,
    buffer: Option<String>,
    arg_pos: usize,
    language: Option<String>,
}

impl PendingItem {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            name: None,
            value: None,
            translations: Translations::new(),
            buffer: None,
            arg_pos: 0,
            language: None,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        self.location.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.get_or_insert_with(String::new).push_str(text);
    }

    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    fn invalid_translation(&self, message: impl Into<String>) -> SpgmError {
        SpgmError::InvalidTranslation {
            location: self.location.clone(),
            name: self.display_name(),
            message: message.into(),
        }
    }

    /// Push the buffer as the next argument (comma).
    pub fn push_argument(&mut self) -> Result<()> {
        let buffer = self.buffer.take();

        if let Some(language) = self.language.take() {
            return self.store_translation(language, buffer);
        }

        match self.arg_pos {
            0 => self.name = buffer,
            1 => self.value = buffer,
            pos if pos % 2 == 0 => {
                let language = self.language_from(buffer)?;
                self.language = Some(language);
                self.arg_pos += 1;
                return Ok(());
            }
            _ => return Err(self.invalid_translation("language is None")),
        }
        self.arg_pos += 1;
        Ok(())
    }

    /// Push the buffer as a language selector (colon).
    pub fn push_language(&mut self) -> Result<()> {
        if self.language.is_some() {
            return Err(self.invalid_translation("language selected twice"));
        }
        let buffer = self.buffer.take();
        let language = self.language_from(buffer)?;
        self.language = Some(language);
        Ok(())
    }

    fn language_from(&self, buffer: Option<String>) -> Result<String> {
        match buffer.as_deref().map(str::trim) {
            Some(language) if !language.is_empty() => Ok(language.to_string()),
            _ => Err(SpgmError::EmptyTranslation {
                location: self.location.clone(),
                name: self.display_name(),
                what: "language",
            }),
        }
    }

    fn store_translation(&mut self, language: String, buffer: Option<String>) -> Result<()> {
        let Some(text) = buffer else {
            return Err(SpgmError::EmptyTranslation {
                location: self.location.clone(),
                name: self.display_name(),
                what: "translation",
            });
        };
        if let Err(err) = self.translations.set(&language, &text) {
            return Err(self.invalid_translation(err.to_string()));
        }
        // next push is a language tag again
        let next = (self.arg_pos + 1).max(2);
        self.arg_pos = next + next % 2;
        Ok(())
    }

    /// Flush the buffer and turn the pending item into an [`Item`].
    pub fn finalize(mut self) -> Result<Item> {
        if self.buffer.is_some() {
            self.push_argument()?;
        }
        if self.language.is_some() {
            return Err(SpgmError::EmptyTranslation {
                location: self.location.clone(),
                name: self.display_name(),
                what: "translation",
            });
        }

        let name = match self.name.take() {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                return Err(SpgmError::MissingIdentifier {
                    location: self.location,
                });
            }
        };
        if self.value.is_none() && self.kind().requires_value() {
            return Err(SpgmError::MissingValue {
                location: self.location,
                name,
            });
        }

        let mut item = Item::from_source(name, self.location);
        item.value = self.value;
        item.translations = self.translations;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(kind: DefinitionKind) -> PendingItem {
        PendingItem::new(Location::new("a.c", 3, 5, kind))
    }

    fn push(p: &mut PendingItem, text: &str) {
        p.append(text);
        p.push_argument().unwrap();
    }

    #[test]
    fn test_name_only() {
        let mut p = pending(DefinitionKind::Spgm);
        push(&mut p, "hello");
        p.push_argument().unwrap();
        let item = p.finalize().unwrap();
        assert_eq!(item.name, "hello");
        assert_eq!(item.value, None);
    }

    #[test]
    fn test_positional_translation() {
        let mut p = pending(DefinitionKind::Spgm);
        for text in ["msg", "Hello", "de", "Hallo"] {
            push(&mut p, text);
        }
        let item = p.finalize().unwrap();
        assert_eq!(item.value.as_deref(), Some("Hello"));
        assert_eq!(item.translations.get("de").as_deref(), Some("Hallo"));
    }

    #[test]
    fn test_colon_translation_without_value() {
        let mut p = pending(DefinitionKind::Spgm);
        push(&mut p, "msg");
        p.append("de");
        p.push_language().unwrap();
        push(&mut p, "Hallo");
        p.append("fr");
        p.push_language().unwrap();
        p.append("Bonjour");
        let item = p.finalize().unwrap();
        assert_eq!(item.value, None);
        assert_eq!(item.translations.get("de").as_deref(), Some("Hallo"));
        assert_eq!(item.translations.get("fr").as_deref(), Some("Bonjour"));
    }

    #[test]
    fn test_missing_name() {
        let p = pending(DefinitionKind::Spgm);
        assert!(matches!(p.finalize(), Err(SpgmError::MissingIdentifier { .. })));
    }

    #[test]
    fn test_define_requires_value() {
        let mut p = pending(DefinitionKind::Define);
        push(&mut p, "hello");
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, SpgmError::MissingValue { ref name, .. } if name == "hello"));
    }

    #[test]
    fn test_empty_language() {
        let mut p = pending(DefinitionKind::Spgm);
        push(&mut p, "msg");
        let err = p.push_language().unwrap_err();
        assert!(matches!(err, SpgmError::EmptyTranslation { what: "language", .. }));
    }

    #[test]
    fn test_conflicting_alias_in_one_macro() {
        let mut p = pending(DefinitionKind::Spgm);
        push(&mut p, "msg");
        p.append("de;at");
        p.push_language().unwrap();
        push(&mut p, "Hallo");
        p.append("at");
        p.push_language().unwrap();
        p.append("Servus");
        let err = p.push_argument().unwrap_err();
        assert!(matches!(err, SpgmError::InvalidTranslation { .. }));
    }
}
