use ringbuffer::{AllocRingBuffer, RingBuffer};
use tch::{nn, Device, Kind, Tensor};

use crate::torch::encoder::{truncated_normal_init, xavier_linear};

/// Recurrent attention state: the last attention read and a fixed-capacity
/// window of the wrapper's own recent outputs.
pub struct AttentionState {
    attns: Tensor,
    window: AllocRingBuffer<Tensor>,
}

impl AttentionState {
    pub fn attns(&self) -> &Tensor {
        &self.attns
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Window contents stacked oldest first: `[1, L, attn_size]`
    fn stacked(&self) -> Tensor {
        let slots: Vec<&Tensor> = self.window.iter().collect();
        Tensor::stack(&slots, 1)
    }
}

/// Additive attention over a sliding window of past outputs, wrapped around a
/// recurrent cell stack.
///
/// Each step mixes the previous attention read into the cell input, queries
/// the window with the full new cell state, and projects the cell output
/// together with the fresh read into the wrapper output. That output is what
/// enters the window, evicting the oldest slot.
pub struct AttentionWrapper {
    attn_length: usize,
    attn_size: i64,
    input_proj: nn::Linear,
    key_proj: nn::Linear,
    query_proj: nn::Linear,
    score_v: Tensor,
    output_proj: nn::Linear,
}

impl AttentionWrapper {
    /// `input_dim` is the width fed to the cell stack, `state_dim` the width of
    /// all cell states concatenated, `attn_size` the cell stack output width.
    pub fn new(
        p: &nn::Path,
        attn_length: usize,
        input_dim: i64,
        state_dim: i64,
        attn_size: i64,
    ) -> Self {
        let attn_vec_size = attn_size;
        let input_proj = xavier_linear(p / "input_proj", input_dim + attn_size, input_dim);
        let key_proj = nn::linear(
            p / "key_proj",
            attn_size,
            attn_vec_size,
            nn::LinearConfig {
                ws_init: truncated_normal_init(attn_size, attn_vec_size),
                bs_init: None,
                bias: false,
            },
        );
        let query_proj = xavier_linear(p / "query_proj", state_dim, attn_vec_size);
        let score_v = p.var(
            "score_v",
            &[attn_vec_size],
            truncated_normal_init(attn_vec_size, 1),
        );
        let output_proj = xavier_linear(p / "output_proj", attn_size + attn_size, attn_size);

        Self {
            attn_length,
            attn_size,
            input_proj,
            key_proj,
            query_proj,
            score_v,
            output_proj,
        }
    }

    /// Zero read and a window pre-filled with zero outputs
    pub fn init_state(&self, device: Device) -> AttentionState {
        let mut window = AllocRingBuffer::new(self.attn_length);
        for _ in 0..self.attn_length {
            window.push(Tensor::zeros([1, self.attn_size], (Kind::Float, device)));
        }
        AttentionState {
            attns: Tensor::zeros([1, self.attn_size], (Kind::Float, device)),
            window,
        }
    }

    /// `[1, input_dim]` -> `[1, input_dim]`, mixing in the previous read
    pub fn prepare_input(&self, input: &Tensor, state: &AttentionState) -> Tensor {
        Tensor::cat(&[input, &state.attns], 1).apply(&self.input_proj)
    }

    /// Attends over the window with `query` (all new cell states, `[1, state_dim]`),
    /// produces the wrapper output from `cell_output` (`[1, attn_size]`) and
    /// slides the window forward by one.
    pub fn attend(
        &self,
        query: &Tensor,
        cell_output: &Tensor,
        state: &mut AttentionState,
    ) -> Tensor {
        let window = state.stacked();
        let keys = window.apply(&self.key_proj);
        let q = query.apply(&self.query_proj).unsqueeze(1);

        let scores = ((keys + q).tanh() * &self.score_v).sum_dim_intlist(-1, false, Kind::Float);
        let weights = scores.softmax(-1, Kind::Float).unsqueeze(-1);
        let read = (weights * &window).sum_dim_intlist(1, false, Kind::Float);

        let output = Tensor::cat(&[cell_output, &read], 1).apply(&self.output_proj);

        state.attns = read;
        state.window.push(output.shallow_clone());
        output
    }
}
