//! Mask generation.
//!
//! A [`MaskAction`] picks fragments of a canonical program and replaces each
//! one with [`MASK_TOKEN`], producing one [`MaskedProgram`] per fragment.
//! Actions are pure and see only the program's tree and text.

mod actions;

use model_syntax::Span;
use tracing::warn;

use crate::program::{placeholder_count, MaskedProgram, SourceProgram, MASK_TOKEN};

pub use actions::{
    CompileArgumentMask, FitArgumentMask, LayerArgumentMask, LayerConstructMask, OptimizerMask,
};

/// Produces masked variants of a program.
pub trait MaskAction: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Masked variants, in source order.
    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram>;
}

/// The actions applied by the mask stage, in order.
pub fn default_actions() -> Vec<Box<dyn MaskAction>> {
    vec![
        Box::new(LayerArgumentMask),
        Box::new(LayerConstructMask),
        Box::new(OptimizerMask),
        Box::new(CompileArgumentMask),
        Box::new(FitArgumentMask),
    ]
}

/// Apply every action to `program`, concatenating results in action order.
///
/// A program that already contains the placeholder identifier yields
/// nothing, since its masked variants would be ambiguous.
pub fn mask_program(program: &SourceProgram, actions: &[Box<dyn MaskAction>]) -> Vec<MaskedProgram> {
    if placeholder_count(&program.text) > 0 {
        warn!(
            event = "mask.placeholder_in_source",
            "program already contains {MASK_TOKEN}, not masking"
        );
        return Vec::new();
    }
    actions
        .iter()
        .flat_map(|action| {
            let masked = action.apply(program);
            tracing::debug!(action = action.name(), produced = masked.len());
            masked
        })
        .collect()
}

/// Replace the text under `span` with the placeholder.
pub(crate) fn splice(text: &str, span: Span) -> Option<MaskedProgram> {
    let original = span.slice(text)?;
    if original.is_empty() {
        return None;
    }
    let masked = format!("{}{}{}", &text[..span.start], MASK_TOKEN, &text[span.end..]);
    MaskedProgram::new(masked, original.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "\
from keras.models import Sequential
from keras.layers import Dense
from keras.optimizers import SGD
model = Sequential()
model.add(Dense(64, input_dim=784, activation='relu'))
model.add(Dense(10, activation='softmax'))
model.compile(loss='categorical_crossentropy', optimizer=SGD(lr=0.01))
model.fit(x, y, epochs=5, batch_size=32)
";

    #[test]
    fn test_every_masked_program_restores_source() {
        let source = SourceProgram::canonical(PROGRAM).unwrap();
        let masked = mask_program(&source, &default_actions());
        assert!(!masked.is_empty());
        for m in &masked {
            assert_eq!(placeholder_count(&m.text), 1);
            assert_eq!(m.original(), source.text);
        }
    }

    #[test]
    fn test_action_order_is_preserved() {
        let source = SourceProgram::canonical(PROGRAM).unwrap();
        let masked = mask_program(&source, &default_actions());
        // layer arguments come first: units of the first Dense
        assert_eq!(masked[0].original_fragment, "64");
        // fit keywords are reordered to batch_size, epochs
        let last = masked.last().unwrap();
        assert_eq!(last.original_fragment, "5");
    }

    #[test]
    fn test_source_with_placeholder_yields_nothing() {
        let source = SourceProgram::canonical("x = __mask_0__\nmodel.fit(x, epochs=1)\n").unwrap();
        assert!(mask_program(&source, &default_actions()).is_empty());
    }

    #[test]
    fn test_splice_synthetic_span() {
        assert!(splice("x = 1\n", Span::SYNTHETIC).is_none());
    }
}
