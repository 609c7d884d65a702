//! Whole-program canonicalization and equivalence checks.

use model_syntax::{
    canonical_form, parse, serialize, structurally_equivalent, NodeRef, ParentIndex,
};

const SEQUENTIAL: &str = r#"
import numpy as np
from keras.models import Sequential
from keras.layers import Dense, Activation
from keras.optimizers import SGD

X = np.random.rand(100, 784)
Y = np.random.rand(100, 10)

model = Sequential()
model.add(Dense(400, input_dim=784))
model.add(Activation('relu'))
model.add(Dense(10))
model.add(Activation("softmax"))
model.compile(loss='categorical_crossentropy', optimizer=SGD(lr=0.1), metrics=['accuracy'])
model.fit(X, Y, nb_epoch=5, batch_size=32)
"#;

const SEQUENTIAL_TF: &str = r#"
import numpy as np
import tensorflow as tf

X = np.random.rand(100, 784)
Y = np.random.rand(100, 10)

model = tf.keras.Sequential()
model.add(tf.keras.layers.Dense(units=400, input_dim=784))
model.add(tf.keras.layers.Activation(activation='relu'))
model.add(tf.keras.layers.Dense(units=10))
model.add(tf.keras.layers.Activation('softmax'))
model.compile(optimizer=tf.keras.optimizers.SGD(learning_rate=0.1), loss='categorical_crossentropy', metrics=['accuracy'])
model.fit(X, Y, batch_size=32, epochs=5)
"#;

#[test]
fn test_two_spellings_of_one_model_are_equivalent() {
    assert!(structurally_equivalent(SEQUENTIAL, SEQUENTIAL_TF));
}

#[test]
fn test_canonical_text_is_stable() {
    let once = canonical_form(SEQUENTIAL).unwrap();
    let twice = canonical_form(&once).unwrap();
    assert_eq!(once, twice);
    assert!(once.contains("model.add(__root__.keras.layers.Dense(units=400, input_dim=784))"));
    assert!(once.contains("X = __root__.numpy.random.rand(100, 784)"));
    assert!(!once.contains("import"));
}

#[test]
fn test_canonical_text_reparses_with_same_serialization() {
    let canonical = canonical_form(SEQUENTIAL_TF).unwrap();
    let module = parse(&canonical).unwrap();
    assert_eq!(serialize(&module), canonical);
}

#[test]
fn test_reflexive_on_sample_programs() {
    for src in [SEQUENTIAL, SEQUENTIAL_TF, "x = 1\n", "def f(*a, **k):\n    pass\n"] {
        assert!(structurally_equivalent(src, src));
        let padded = format!("\n\n{src}\n   ");
        assert!(structurally_equivalent(src, &padded));
    }
}

#[test]
fn test_width_change_is_not_equivalent() {
    let changed = SEQUENTIAL.replace("Dense(400", "Dense(300");
    assert!(!structurally_equivalent(SEQUENTIAL, &changed));
}

#[test]
fn test_parent_index_over_canonical_program() {
    let canonical = canonical_form(SEQUENTIAL).unwrap();
    let module = parse(&canonical).unwrap();
    let index = ParentIndex::build(&module);

    let dense_calls: Vec<_> = index
        .iter()
        .filter(|(_, node)| {
            node.as_expr()
                .and_then(|e| e.as_call())
                .and_then(|c| c.func_path())
                .is_some_and(|p| p == "__root__.keras.layers.Dense")
        })
        .map(|(id, _)| id)
        .collect();
    assert_eq!(dense_calls.len(), 2);

    for id in dense_calls {
        let stmt = index.enclosing_stmt(id).unwrap();
        let text = index.node(stmt).unparse();
        assert!(text.starts_with("model.add("), "{text}");
        // spans point back into the canonical text
        let span = index.node(id).span();
        assert_eq!(span.slice(&canonical).unwrap(), index.node(id).unparse());
        assert!(matches!(index.node(stmt), NodeRef::Stmt(_)));
    }
}
