//! Structural equivalence oracle.

use crate::canonical::canonical_form;

/// True when `a` and `b` are the same program or fragment once whitespace,
/// quoting, import aliasing and argument-passing style are ignored.
///
/// Text that matches after trimming is equivalent without parsing; otherwise
/// either side failing to parse makes the pair not equivalent.
pub fn structurally_equivalent(a: &str, b: &str) -> bool {
    if a.trim() == b.trim() {
        return true;
    }
    match (canonical_form(a), canonical_form(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflexive_even_when_unparseable() {
        assert!(structurally_equivalent("Dense(10)", "Dense(10)"));
        assert!(structurally_equivalent("def (", "  def (\n"));
    }

    #[test]
    fn test_parse_failure_is_not_equivalent() {
        assert!(!structurally_equivalent("x = (", "x = 1"));
    }

    #[test]
    fn test_whitespace_and_quotes() {
        assert!(structurally_equivalent(
            "Dense( 64 , activation = \"relu\" )",
            "Dense(64, activation='relu')"
        ));
    }

    #[test]
    fn test_positional_and_keyword_spellings() {
        let a = "import keras\nm.add(keras.layers.Dense(64, 'relu'))\n";
        let b = "from keras.layers import Dense\nm.add(Dense(activation='relu', units=64))\n";
        assert!(structurally_equivalent(a, b));
    }

    #[test]
    fn test_compile_and_fit_positionals() {
        assert!(structurally_equivalent(
            "model.fit(x, y, 32, 10)\n",
            "model.fit(x, y, batch_size=32, epochs=10)\n"
        ));
        assert!(structurally_equivalent(
            "model.compile('sgd', 'mse')\n",
            "model.compile(loss='mse', optimizer='sgd')\n"
        ));
        assert!(!structurally_equivalent(
            "model.fit(x, y, 32, 10)\n",
            "model.fit(x, y, batch_size=10, epochs=32)\n"
        ));
    }

    #[test]
    fn test_different_values_differ() {
        assert!(!structurally_equivalent("300", "400"));
        assert!(!structurally_equivalent("'relu'", "'tanh'"));
    }
}
