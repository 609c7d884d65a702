//! Bad-change heuristic: reject predictions that break the input or output
//! width of a layer chain.
//!
//! Only edits to a layer constructor inside a recognised chain are judged.
//! Anything the heuristic cannot confirm (unknown layer kinds, unparseable
//! text, no chain) is accepted.

use model_syntax::visit::walk_expr_mut;
use model_syntax::{
    canonical_form, parse, parse_expression, unparse_expr, Call, Expr, ExprKind, NodeRef,
    ParentIndex, ParseError, StmtKind,
};

use super::chain::{recognise, LayerChain, LAYERS};
use crate::program::MASK_TOKEN;

const KERAS: &str = "__root__.keras.";
const INPUT: &str = "__root__.keras.layers.Input";
const DENSE: &str = "__root__.keras.layers.Dense";
const ACTIVATION: &str = "__root__.keras.layers.Activation";

#[derive(Debug, thiserror::Error)]
enum Undecided {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("placeholder not found")]
    NoPlaceholder,
    #[error("no shape rule for {0}")]
    UnknownLayer(String),
}

/// True when substituting `predicted` for `original` in `masked` changes a
/// layer's input shape or the model's output width.
pub fn is_bad_change(masked: &str, original: &str, predicted: &str) -> bool {
    match judge(masked, original, predicted) {
        Ok(bad) => bad,
        Err(err) => {
            tracing::warn!(event = "filter.bad_change.undecided", error = %err);
            false
        }
    }
}

fn judge(masked: &str, original: &str, predicted: &str) -> Result<bool, Undecided> {
    let masked = canonical_form(masked)?;
    let original = fragment(original)?;
    let predicted = fragment(predicted)?;

    let (Some(src), Some(trg)) = (context(&masked, &original)?, context(&masked, &predicted)?)
    else {
        return Ok(false);
    };
    let (Some(src), Some(trg)) = (layer_call(&src), layer_call(&trg)) else {
        return Ok(false);
    };

    let module = parse(&masked)?;
    let Some(chain) = recognise(&module) else {
        return Ok(false);
    };

    if input_changed(chain.position, input_shape(&src)?, input_shape(&trg)?) {
        return Ok(true);
    }
    if is_tail(&chain) {
        let before = output_width(&chain, &src, chain.position)?;
        let after = output_width(&chain, &trg, chain.position)?;
        if let (Some(before), Some(after)) = (before, after) {
            return Ok(before != after);
        }
    }
    Ok(false)
}

fn fragment(text: &str) -> Result<String, Undecided> {
    Ok(canonical_form(text)?.trim_end().to_string())
}

fn is_model_code(text: &str) -> bool {
    text.contains(KERAS) || text.contains(".compile(") || text.contains(".fit(")
}

/// The expression whose meaning `fragment` changes, with `fragment` in
/// place. `None` when that context is a statement other than an expression.
fn context(masked: &str, fragment: &str) -> Result<Option<Expr>, Undecided> {
    if fragment.starts_with(KERAS) || fragment.contains(".compile(") || fragment.contains(".fit(")
    {
        return Ok(Some(parse_expression(fragment)?));
    }

    let module = parse(masked)?;
    let index = ParentIndex::build(&module);
    let mask = index.find_name(MASK_TOKEN).ok_or(Undecided::NoPlaceholder)?;
    let anchor = index
        .ancestors(mask)
        .find(|&id| {
            let node = index.node(id);
            matches!(node, NodeRef::Expr(_) | NodeRef::Stmt(_)) && is_model_code(&node.unparse())
        })
        .or_else(|| index.enclosing_stmt(mask))
        .ok_or(Undecided::NoPlaceholder)?;

    let node = index.node(anchor);
    let text = node.unparse().replacen(MASK_TOKEN, fragment, 1);
    if let NodeRef::Expr(_) = node {
        return Ok(Some(parse_expression(&text)?));
    }
    let mut substituted = parse(&text)?;
    if substituted.body.is_empty() {
        return Ok(None);
    }
    match substituted.body.swap_remove(0).kind {
        StmtKind::Expr { value } => Ok(Some(value)),
        _ => Ok(None),
    }
}

/// The layer constructor call of `expr`, unwrapping a functional
/// application `Layer(...)(x)`.
fn layer_call(expr: &Expr) -> Option<Call<'_>> {
    let call = expr.as_call()?;
    if matches!(call.func_path(), Some(path) if path.starts_with(LAYERS)) {
        return Some(call);
    }
    let inner = call.func.as_call()?;
    matches!(inner.func_path(), Some(path) if path.starts_with(LAYERS)).then_some(inner)
}

/// Shape text with list literals read as tuples.
fn shape_text(expr: &Expr) -> String {
    let mut shape = expr.clone();
    walk_expr_mut(&mut shape, &mut |e| {
        if let ExprKind::List(items) = &mut e.kind {
            e.kind = ExprKind::Tuple(std::mem::take(items));
        }
    });
    unparse_expr(&shape)
}

fn input_shape(call: &Call<'_>) -> Result<Option<String>, Undecided> {
    let path = call.func_path().unwrap_or_default();
    if path == INPUT {
        return Ok(call.keyword("shape").map(shape_text));
    }
    if !path.starts_with(LAYERS) {
        return Err(Undecided::UnknownLayer(path));
    }
    if let Some(dim) = call.keyword("input_dim") {
        return Ok(Some(format!("({},)", unparse_expr(dim))));
    }
    Ok(call.keyword("input_shape").map(shape_text))
}

fn input_changed(position: usize, before: Option<String>, after: Option<String>) -> bool {
    match (before, after) {
        (None, None) => false,
        // the first layer must keep declaring its input
        (Some(_), None) | (None, Some(_)) if position == 0 => true,
        // an input declared on an inner layer cannot be confirmed
        (None, Some(_)) => false,
        (Some(_), None) => false,
        (Some(before), Some(after)) => before != after,
    }
}

/// The placeholder layer is the last one, or the last one before a final
/// activation.
fn is_tail(chain: &LayerChain<'_>) -> bool {
    let len = chain.len();
    if chain.position + 1 == len {
        return true;
    }
    chain.position + 2 == len
        && chain
            .layers
            .last()
            .is_some_and(|last| unparse_expr(last).contains(ACTIVATION))
}

fn output_width(
    chain: &LayerChain<'_>,
    call: &Call<'_>,
    position: usize,
) -> Result<Option<String>, Undecided> {
    let path = call.func_path().unwrap_or_default();
    if path == DENSE {
        return Ok(call.keyword("units").or(call.args.first()).map(unparse_expr));
    }
    if path == ACTIVATION && position > 0 {
        let previous = chain.layers[position - 1];
        let previous_call = layer_call(previous)
            .ok_or_else(|| Undecided::UnknownLayer(unparse_expr(previous)))?;
        return output_width(chain, &previous_call, position - 1);
    }
    Err(Undecided::UnknownLayer(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LAYERS: &str = "\
model = __root__.keras.models.Sequential()
model.add(__mask_0__)
model.add(__root__.keras.layers.Dense(units=10, activation='softmax'))
";

    fn first_layer(original: &str, predicted: &str) -> bool {
        is_bad_change(TWO_LAYERS, original, predicted)
    }

    #[test]
    fn test_first_layer_drops_input() {
        assert!(first_layer(
            "__root__.keras.layers.Dense(units=64, input_dim=784)",
            "__root__.keras.layers.Dense(units=64)"
        ));
    }

    #[test]
    fn test_first_layer_changes_input() {
        assert!(first_layer(
            "__root__.keras.layers.Dense(units=64, input_dim=784)",
            "__root__.keras.layers.Dense(units=64, input_dim=100)"
        ));
        // input_dim and input_shape spell the same input
        assert!(!first_layer(
            "__root__.keras.layers.Dense(units=64, input_dim=784)",
            "__root__.keras.layers.Dense(units=64, input_shape=[784])"
        ));
    }

    #[test]
    fn test_first_layer_width_change_is_fine() {
        assert!(!first_layer(
            "__root__.keras.layers.Dense(units=64, input_dim=784)",
            "__root__.keras.layers.Dense(units=32, input_dim=784)"
        ));
    }

    #[test]
    fn test_first_layer_without_input_on_both_sides() {
        assert!(!first_layer(
            "__root__.keras.layers.Dense(units=64)",
            "__root__.keras.layers.Dense(units=32)"
        ));
    }

    #[test]
    fn test_last_layer_width_change() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__root__.keras.layers.Dense(units=__mask_0__, activation='softmax'))
";
        assert!(is_bad_change(masked, "10", "5"));
        assert!(!is_bad_change(masked, "10", "10"));
    }

    #[test]
    fn test_width_before_final_activation() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__root__.keras.layers.Dense(units=__mask_0__))
model.add(__root__.keras.layers.Activation(activation='softmax'))
";
        assert!(is_bad_change(masked, "10", "5"));
    }

    #[test]
    fn test_final_activation_inherits_width() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__root__.keras.layers.Dense(units=10))
model.add(__mask_0__)
";
        assert!(!is_bad_change(
            masked,
            "__root__.keras.layers.Activation(activation='softmax')",
            "__root__.keras.layers.Activation(activation='sigmoid')"
        ));
    }

    #[test]
    fn test_middle_layer_width_change_is_fine() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__root__.keras.layers.Dense(units=__mask_0__))
model.add(__root__.keras.layers.Dense(units=10))
";
        assert!(!is_bad_change(masked, "32", "16"));
    }

    #[test]
    fn test_inner_layer_input_rules() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__mask_0__)
model.add(__root__.keras.layers.Dense(units=10))
";
        // dropping an inner input declaration is fine
        assert!(!is_bad_change(
            masked,
            "__root__.keras.layers.Dense(units=32, input_dim=64)",
            "__root__.keras.layers.Dense(units=32)"
        ));
        // declaring one where there was none cannot be confirmed
        assert!(!is_bad_change(
            masked,
            "__root__.keras.layers.Dense(units=32)",
            "__root__.keras.layers.Dense(units=32, input_dim=10)"
        ));
        // changing it is not
        assert!(is_bad_change(
            masked,
            "__root__.keras.layers.Dense(units=32, input_dim=64)",
            "__root__.keras.layers.Dense(units=32, input_dim=63)"
        ));
    }

    #[test]
    fn test_functional_output_width() {
        let masked = "\
x = __root__.keras.layers.Input(shape=(784,))
h = __root__.keras.layers.Dense(units=64)(x)
y = __root__.keras.layers.Dense(units=__mask_0__)(h)
";
        assert!(is_bad_change(masked, "10", "3"));
    }

    #[test]
    fn test_unrelated_edits_are_accepted() {
        let masked = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=10, input_dim=784))
model.fit(x, y, epochs=__mask_0__)
";
        assert!(!is_bad_change(masked, "10", "20"));
        // unparseable prediction
        assert!(!is_bad_change(TWO_LAYERS, "__root__.keras.layers.Dense(units=64)", "Dense(("));
        // unknown layer kind at the tail
        let conv_tail = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=10, input_dim=784))
model.add(__root__.keras.layers.Conv1D(filters=__mask_0__))
";
        assert!(!is_bad_change(conv_tail, "8", "4"));
    }
}
