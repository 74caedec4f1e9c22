pub mod network {
    /// Widths of the fully-connected feature encoder layers
    pub const DENSE_UNITS: [i64; 3] = [1024, 512, 256];
    /// Hidden widths of the LSTM cells stacked below the output cell
    pub const RNN_HIDDEN_UNITS: [i64; 2] = [128, 64];
    /// How many of its own recent outputs the attention wrapper looks back over
    pub const ATTN_LENGTH: usize = 30;
    pub const LEARNING_RATE: f64 = 0.001;
}

pub mod feed {
    pub const KEEP_PROB: f64 = 0.8;
    pub const FEE: f64 = 1e-3;
    pub const TEMPERATURE: f64 = 1.0;
    pub const RISK_FREE: f64 = 0.0;
}

pub mod files {
    pub const CHECKPOINT_DIR: &str = "./trade_model_checkpoint";
    /// File written inside a checkpoint directory
    pub const CHECKPOINT_FILE: &str = "trade_model.ot";
}

pub mod train {
    pub const STEPS: usize = 1000;
    pub const LOG_EVERY: usize = 25;
}
