//! Candidate generation: masked programs in, candidate repairs out.
//!
//! Each masked program is turned into a snippet according to the configured
//! [`SnippetMode`], all snippets of an item go to the infill service as one
//! batch, and predictions are zipped back onto their masked programs. The
//! zip is strict: any count mismatch is a [`RepairError::ContractViolation`].

use model_syntax::{parse, unparse_stmt, ParentIndex, Stmt};

use crate::config::SnippetMode;
use crate::error::{RepairError, Result};
use crate::infill::InfillService;
use crate::program::{Candidate, MaskedProgram, MASK_TOKEN};

/// Text sent to the infill model, and the masked program its predictions
/// will be substituted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    pub target: MaskedProgram,
}

pub fn prepare_snippet(masked: &MaskedProgram, mode: SnippetMode) -> Snippet {
    match mode {
        SnippetMode::WholeProgram => Snippet {
            text: masked.text.clone(),
            target: masked.clone(),
        },
        SnippetMode::ModelContext => Snippet {
            text: model_context(&masked.text).unwrap_or_else(|| masked.text.clone()),
            target: masked.clone(),
        },
        SnippetMode::MaskLine => {
            let target = mask_whole_line(masked).unwrap_or_else(|| masked.clone());
            Snippet {
                text: target.text.clone(),
                target,
            }
        }
    }
}

fn is_model_statement(text: &str) -> bool {
    [MASK_TOKEN, "__root__.keras.", ".add(", ".compile(", ".fit("]
        .iter()
        .any(|marker| text.contains(marker))
}

/// Model-building statements of the block holding the placeholder.
fn model_context(text: &str) -> Option<String> {
    let module = parse(text).ok()?;
    let index = ParentIndex::build(&module);
    let mask = index.find_name(MASK_TOKEN)?;
    let stmt = index.enclosing_stmt(mask)?;
    let block: Vec<&Stmt> = match index.parent(stmt) {
        Some(parent) => index
            .node(parent)
            .children()
            .into_iter()
            .filter_map(|child| child.as_stmt())
            .collect(),
        None => module.body.iter().collect(),
    };
    let lines: Vec<String> = block
        .into_iter()
        .map(unparse_stmt)
        .filter(|line| is_model_statement(line))
        .collect();
    Some(lines.join("\n") + "\n")
}

/// Widen the mask to the whole line holding the placeholder. The original
/// fragment becomes the unmasked line, without indentation.
fn mask_whole_line(masked: &MaskedProgram) -> Option<MaskedProgram> {
    let lines: Vec<&str> = masked.text.split_inclusive('\n').collect();
    let at = lines.iter().position(|line| line.contains(MASK_TOKEN))?;
    let line = lines[at].trim_end_matches('\n');
    let code = line.trim_start();
    let indent = &line[..line.len() - code.len()];
    let original_line = code.replacen(MASK_TOKEN, &masked.original_fragment, 1);

    let mut text = String::with_capacity(masked.text.len());
    for (i, l) in lines.iter().enumerate() {
        if i == at {
            text.push_str(indent);
            text.push_str(MASK_TOKEN);
            if l.ends_with('\n') {
                text.push('\n');
            }
        } else {
            text.push_str(l);
        }
    }
    MaskedProgram::new(text, original_line).ok()
}

/// Ask the infill service for `top_k` predictions per masked program.
///
/// The service must already be started.
pub async fn generate_candidates(
    infill: &mut dyn InfillService,
    masked: &[MaskedProgram],
    top_k: usize,
    mode: SnippetMode,
) -> Result<Vec<Candidate>> {
    if masked.is_empty() {
        return Ok(Vec::new());
    }
    let snippets: Vec<Snippet> = masked.iter().map(|m| prepare_snippet(m, mode)).collect();
    for snippet in &snippets {
        infill.submit(snippet.text.clone(), top_k);
    }
    let predictions = infill.commit().await?;
    if predictions.len() != snippets.len() {
        return Err(RepairError::ContractViolation(format!(
            "{} snippets submitted, {} prediction lists returned",
            snippets.len(),
            predictions.len()
        )));
    }

    let mut candidates = Vec::with_capacity(snippets.len() * top_k);
    for (i, (snippet, preds)) in snippets.into_iter().zip(predictions).enumerate() {
        if preds.len() != top_k {
            return Err(RepairError::ContractViolation(format!(
                "snippet {i}: expected {top_k} predictions, got {}",
                preds.len()
            )));
        }
        for predicted in preds {
            candidates.push(Candidate {
                masked: snippet.target.clone(),
                predicted,
            });
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedInfill;

    fn masked(text: &str, fragment: &str) -> MaskedProgram {
        MaskedProgram::new(text.to_string(), fragment.to_string()).unwrap()
    }

    const FUNCTION_PROGRAM: &str = "\
import os
def build(path):
    data = os.listdir(path)
    model = __root__.keras.models.Sequential()
    model.add(__root__.keras.layers.Dense(units=__mask_0__))
    model.compile(loss='mse')
    return model
";

    #[test]
    fn test_whole_program_snippet() {
        let m = masked("x = __mask_0__\n", "1");
        let snippet = prepare_snippet(&m, SnippetMode::WholeProgram);
        assert_eq!(snippet.text, m.text);
        assert_eq!(snippet.target, m);
    }

    #[test]
    fn test_model_context_keeps_model_statements() {
        let m = masked(FUNCTION_PROGRAM, "64");
        let snippet = prepare_snippet(&m, SnippetMode::ModelContext);
        assert_eq!(
            snippet.text,
            "model = __root__.keras.models.Sequential()\n\
             model.add(__root__.keras.layers.Dense(units=__mask_0__))\n\
             model.compile(loss='mse')\n"
        );
        assert_eq!(snippet.target, m);
    }

    #[test]
    fn test_mask_line_widens_fragment() {
        let m = masked(FUNCTION_PROGRAM, "64");
        let snippet = prepare_snippet(&m, SnippetMode::MaskLine);
        assert!(snippet.text.contains("\n    __mask_0__\n"));
        assert_eq!(
            snippet.target.original_fragment,
            "model.add(__root__.keras.layers.Dense(units=64))"
        );
        assert_eq!(snippet.target.original(), m.original());
    }

    #[tokio::test]
    async fn test_candidates_follow_masked_order() {
        let a = masked("x = __mask_0__\n", "1");
        let b = masked("y = __mask_0__\n", "2");
        let mut infill = ScriptedInfill::new(vec![vec![
            vec!["3".to_string(), "4".to_string()],
            vec!["5".to_string(), "6".to_string()],
        ]]);
        let out = generate_candidates(&mut infill, &[a.clone(), b.clone()], 2, SnippetMode::WholeProgram)
            .await
            .unwrap();
        let repaired: Vec<String> = out.iter().map(Candidate::repaired).collect();
        assert_eq!(repaired, vec!["x = 3\n", "x = 4\n", "y = 5\n", "y = 6\n"]);
        assert_eq!(infill.submitted(), vec![a.text, b.text]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_contract_violation() {
        let a = masked("x = __mask_0__\n", "1");
        let mut short = ScriptedInfill::new(vec![vec![]]);
        let err = generate_candidates(&mut short, &[a.clone()], 1, SnippetMode::WholeProgram)
            .await
            .unwrap_err();
        assert!(matches!(err, RepairError::ContractViolation(_)));

        let mut wrong_k = ScriptedInfill::new(vec![vec![vec!["1".to_string()]]]);
        let err = generate_candidates(&mut wrong_k, &[a], 2, SnippetMode::WholeProgram)
            .await
            .unwrap_err();
        assert!(matches!(err, RepairError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn test_no_masked_programs_skips_service() {
        let mut infill = ScriptedInfill::new(vec![]);
        let out = generate_candidates(&mut infill, &[], 1, SnippetMode::WholeProgram)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(infill.submitted().is_empty());
    }
}
