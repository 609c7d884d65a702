//! Known call signatures for framework constructors and model methods.
//!
//! Only the parameter positions that agree across framework releases are
//! listed as positional; anything beyond `max_positional` leaves a call
//! untouched.

/// Shape of one known callable.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Parameter names in declaration order.
    pub params: &'static [&'static str],
    pub max_positional: usize,
    /// Legacy keyword spellings and their current names.
    pub renames: &'static [(&'static str, &'static str)],
}

impl Signature {
    const fn constructor(
        params: &'static [&'static str],
        max_positional: usize,
        renames: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            params,
            max_positional,
            renames,
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| *p == name)
    }

    pub fn rename<'a>(&self, name: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(legacy, _)| *legacy == name)
            .map(|(_, current)| *current)
            .unwrap_or(name)
    }
}

const NO_RENAMES: &[(&str, &str)] = &[];

const DENSE_RENAMES: &[(&str, &str)] = &[
    ("output_dim", "units"),
    ("init", "kernel_initializer"),
    ("W_regularizer", "kernel_regularizer"),
    ("b_regularizer", "bias_regularizer"),
    ("W_constraint", "kernel_constraint"),
    ("b_constraint", "bias_constraint"),
    ("bias", "use_bias"),
];

const CONV_RENAMES: &[(&str, &str)] = &[
    ("nb_filter", "filters"),
    ("init", "kernel_initializer"),
    ("border_mode", "padding"),
    ("subsample", "strides"),
    ("subsample_length", "strides"),
    ("filter_length", "kernel_size"),
    ("W_regularizer", "kernel_regularizer"),
    ("b_regularizer", "bias_regularizer"),
    ("dim_ordering", "data_format"),
];

const POOL_RENAMES: &[(&str, &str)] = &[
    ("pool_length", "pool_size"),
    ("stride", "strides"),
    ("border_mode", "padding"),
    ("dim_ordering", "data_format"),
];

const RNN_RENAMES: &[(&str, &str)] = &[
    ("output_dim", "units"),
    ("init", "kernel_initializer"),
    ("inner_init", "recurrent_initializer"),
    ("inner_activation", "recurrent_activation"),
    ("dropout_W", "dropout"),
    ("dropout_U", "recurrent_dropout"),
];

const OPTIMIZER_RENAMES: &[(&str, &str)] = &[("lr", "learning_rate")];

const DENSE: &[&str] = &[
    "units",
    "activation",
    "use_bias",
    "kernel_initializer",
    "bias_initializer",
    "kernel_regularizer",
    "bias_regularizer",
    "activity_regularizer",
    "kernel_constraint",
    "bias_constraint",
];

const CONV: &[&str] = &[
    "filters",
    "kernel_size",
    "strides",
    "padding",
    "data_format",
    "dilation_rate",
];

const POOL: &[&str] = &["pool_size", "strides", "padding", "data_format"];

const GATED_RNN: &[&str] = &["units", "activation", "recurrent_activation", "use_bias"];

const SIMPLE_RNN: &[&str] = &["units", "activation", "use_bias"];

const COMPILE: Signature = Signature {
    params: &[
        "optimizer",
        "loss",
        "metrics",
        "loss_weights",
        "sample_weight_mode",
        "weighted_metrics",
    ],
    max_positional: 5,
    renames: NO_RENAMES,
};

const FIT: Signature = Signature {
    params: &[
        "x",
        "y",
        "batch_size",
        "epochs",
        "verbose",
        "callbacks",
        "validation_split",
        "validation_data",
        "shuffle",
        "class_weight",
        "sample_weight",
        "initial_epoch",
        "steps_per_epoch",
        "validation_steps",
    ],
    max_positional: 6,
    renames: &[("nb_epoch", "epochs")],
};

/// Look up a constructor by its canonical dotted path, without the root
/// qualifier (e.g. `keras.layers.Dense`).
pub fn constructor(path: &str) -> Option<Signature> {
    let sig = match path.strip_prefix("keras.")? {
        "layers.Dense" => Signature::constructor(DENSE, 2, DENSE_RENAMES),
        "layers.Dropout" => {
            Signature::constructor(&["rate", "noise_shape", "seed"], 1, &[("p", "rate")])
        }
        "layers.Activation" => Signature::constructor(&["activation"], 1, NO_RENAMES),
        "layers.Input" => Signature::constructor(
            &["shape", "batch_size", "name", "dtype", "sparse", "tensor"],
            1,
            NO_RENAMES,
        ),
        "layers.Conv1D" | "layers.Conv2D" | "layers.Conv3D" => {
            Signature::constructor(CONV, 2, CONV_RENAMES)
        }
        "layers.MaxPooling1D"
        | "layers.MaxPooling2D"
        | "layers.MaxPooling3D"
        | "layers.AveragePooling1D"
        | "layers.AveragePooling2D"
        | "layers.AveragePooling3D" => Signature::constructor(POOL, 2, POOL_RENAMES),
        "layers.Flatten" => Signature::constructor(&["data_format"], 1, NO_RENAMES),
        "layers.Embedding" => Signature::constructor(
            &[
                "input_dim",
                "output_dim",
                "embeddings_initializer",
                "embeddings_regularizer",
                "activity_regularizer",
                "embeddings_constraint",
                "mask_zero",
                "input_length",
            ],
            2,
            &[("init", "embeddings_initializer")],
        ),
        "layers.LSTM" | "layers.GRU" => Signature::constructor(GATED_RNN, 1, RNN_RENAMES),
        "layers.SimpleRNN" => Signature::constructor(SIMPLE_RNN, 1, RNN_RENAMES),
        "layers.BatchNormalization" => Signature::constructor(
            &["axis", "momentum", "epsilon", "center", "scale"],
            0,
            NO_RENAMES,
        ),
        "layers.Reshape" => Signature::constructor(&["target_shape"], 1, NO_RENAMES),
        "models.Sequential" => Signature::constructor(&["layers", "name"], 1, NO_RENAMES),
        "models.Model" => Signature::constructor(
            &["inputs", "outputs", "name"],
            2,
            &[("input", "inputs"), ("output", "outputs")],
        ),
        "optimizers.SGD" => Signature::constructor(
            &["learning_rate", "momentum", "nesterov"],
            2,
            OPTIMIZER_RENAMES,
        ),
        "optimizers.Adam" => Signature::constructor(
            &["learning_rate", "beta_1", "beta_2", "epsilon"],
            4,
            OPTIMIZER_RENAMES,
        ),
        "optimizers.RMSprop" => {
            Signature::constructor(&["learning_rate", "rho"], 2, OPTIMIZER_RENAMES)
        }
        "optimizers.Adagrad" => Signature::constructor(&["learning_rate"], 1, OPTIMIZER_RENAMES),
        "optimizers.Adadelta" => Signature::constructor(
            &["learning_rate", "rho", "epsilon"],
            3,
            OPTIMIZER_RENAMES,
        ),
        _ => return None,
    };
    Some(sig)
}

/// Signature of a model method called through an arbitrary receiver.
pub fn method(name: &str) -> Option<Signature> {
    match name {
        "compile" => Some(COMPILE),
        "fit" => Some(FIT),
        _ => None,
    }
}

/// Prefix rewrites between equivalent module paths, applied on whole
/// dotted segments until nothing changes.
pub const PATH_ALIASES: &[(&str, &str)] = &[
    ("tensorflow.python.keras", "keras"),
    ("tensorflow.keras", "keras"),
    ("keras.layers.core", "keras.layers"),
    ("keras.layers.convolutional", "keras.layers"),
    ("keras.layers.pooling", "keras.layers"),
    ("keras.layers.recurrent", "keras.layers"),
    ("keras.layers.normalization", "keras.layers"),
    ("keras.layers.embeddings", "keras.layers"),
    ("keras.layers.advanced_activations", "keras.layers"),
    ("keras.layers.merge", "keras.layers"),
    ("keras.Sequential", "keras.models.Sequential"),
    ("keras.Model", "keras.models.Model"),
    ("keras.Input", "keras.layers.Input"),
    ("keras.engine.topology.Input", "keras.layers.Input"),
    ("keras.layers.Convolution1D", "keras.layers.Conv1D"),
    ("keras.layers.Convolution2D", "keras.layers.Conv2D"),
    ("keras.layers.Convolution3D", "keras.layers.Conv3D"),
    ("keras.layers.MaxPool1D", "keras.layers.MaxPooling1D"),
    ("keras.layers.MaxPool2D", "keras.layers.MaxPooling2D"),
    ("keras.layers.MaxPool3D", "keras.layers.MaxPooling3D"),
    ("keras.layers.AvgPool1D", "keras.layers.AveragePooling1D"),
    ("keras.layers.AvgPool2D", "keras.layers.AveragePooling2D"),
    ("keras.layers.AvgPool3D", "keras.layers.AveragePooling3D"),
    ("keras.optimizers.sgd", "keras.optimizers.SGD"),
    ("keras.optimizers.adam", "keras.optimizers.Adam"),
    ("keras.optimizers.rmsprop", "keras.optimizers.RMSprop"),
    ("keras.optimizers.adagrad", "keras.optimizers.Adagrad"),
    ("keras.optimizers.adadelta", "keras.optimizers.Adadelta"),
];
