use tch::nn::{LSTMState, RNN};
use tch::{nn, Device, Tensor};

use crate::torch::attention::{AttentionState, AttentionWrapper};

/// Recurrent state of the whole allocator for one trajectory
pub struct AllocatorState {
    cells: Vec<LSTMState>,
    attention: Option<AttentionState>,
}

impl AllocatorState {
    /// All cell states concatenated, `c` then `h` per layer: `[1, state_dim]`
    fn flat(&self) -> Tensor {
        let parts: Vec<Tensor> = self
            .cells
            .iter()
            .flat_map(|s| [s.c().squeeze_dim(0), s.h().squeeze_dim(0)])
            .collect();
        Tensor::cat(&parts, 1)
    }
}

/// Zeroes both LSTM biases and starts the forget gate at 1. Gates are laid
/// out input, forget, cell, output.
fn init_forget_bias(p: &nn::Path, hidden: i64) {
    tch::no_grad(|| {
        if let Some(mut bias) = p.get("bias_ih_l0") {
            let _ = bias.zero_();
            let _ = bias.narrow(0, hidden, hidden).fill_(1.0);
        }
        if let Some(mut bias) = p.get("bias_hh_l0") {
            let _ = bias.zero_();
        }
    });
}

/// LSTM stack whose top cell is as wide as the action vector, wrapped in
/// windowed self-attention. Runs causally over a single trajectory.
pub struct RecurrentAllocator {
    cells: Vec<nn::LSTM>,
    attention: Option<AttentionWrapper>,
    device: Device,
}

impl RecurrentAllocator {
    pub fn new(
        p: &nn::Path,
        input_dim: i64,
        hidden_units: &[i64],
        output_dim: i64,
        attn_length: usize,
    ) -> Self {
        let widths: Vec<i64> = hidden_units
            .iter()
            .copied()
            .chain(std::iter::once(output_dim))
            .collect();

        let mut cells = Vec::with_capacity(widths.len());
        let mut in_dim = input_dim;
        for (i, &hidden) in widths.iter().enumerate() {
            let path = p / format!("lstm{i}");
            cells.push(nn::lstm(&path, in_dim, hidden, Default::default()));
            init_forget_bias(&path, hidden);
            in_dim = hidden;
        }

        let attention = (attn_length > 0).then(|| {
            let state_dim = 2 * widths.iter().sum::<i64>();
            AttentionWrapper::new(&(p / "attention"), attn_length, input_dim, state_dim, output_dim)
        });

        Self {
            cells,
            attention,
            device: p.device(),
        }
    }

    pub fn init_state(&self) -> AllocatorState {
        AllocatorState {
            cells: self.cells.iter().map(|cell| cell.zero_state(1)).collect(),
            attention: self
                .attention
                .as_ref()
                .map(|attention| attention.init_state(self.device)),
        }
    }

    /// Advances the state by one timestep. `input` is `[1, input_dim]`, the
    /// result `[1, output_dim]`.
    pub fn step(&self, input: &Tensor, state: &mut AllocatorState) -> Tensor {
        let mut x = match (&self.attention, &state.attention) {
            (Some(attention), Some(attn_state)) => attention.prepare_input(input, attn_state),
            _ => input.shallow_clone(),
        };

        for (cell, cell_state) in self.cells.iter().zip(state.cells.iter_mut()) {
            *cell_state = cell.step(&x, cell_state);
            x = cell_state.h().squeeze_dim(0);
        }

        let Some(attention) = &self.attention else {
            return x;
        };
        let query = state.flat();
        match state.attention.as_mut() {
            Some(attn_state) => attention.attend(&query, &x, attn_state),
            None => x,
        }
    }

    /// `[T, input_dim]` -> `[T, output_dim]`, threading the state left to right
    pub fn forward(&self, latent: &Tensor) -> Tensor {
        let steps = latent.size()[0];
        let mut state = self.init_state();
        let outputs: Vec<Tensor> = (0..steps)
            .map(|t| self.step(&latent.get(t).unsqueeze(0), &mut state))
            .collect();
        Tensor::cat(&outputs, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn allocator(attn_length: usize) -> (nn::VarStore, RecurrentAllocator) {
        let vs = nn::VarStore::new(Device::Cpu);
        let allocator = RecurrentAllocator::new(&vs.root(), 6, &[8, 4], 3, attn_length);
        (vs, allocator)
    }

    #[test]
    fn produces_one_output_per_timestep() {
        let (_vs, allocator) = allocator(5);
        let latent = Tensor::randn([9, 6], (Kind::Float, Device::Cpu));

        let out = allocator.forward(&latent);
        assert_eq!(out.size(), vec![9, 3]);
    }

    #[test]
    fn zero_attention_window_bypasses_wrapper() {
        let (_vs, allocator) = allocator(0);
        let latent = Tensor::randn([4, 6], (Kind::Float, Device::Cpu));

        let out = allocator.forward(&latent);
        assert_eq!(out.size(), vec![4, 3]);
        // LSTM hidden output is tanh-bounded
        assert!(out.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn outputs_are_causal() {
        let (_vs, allocator) = allocator(3);
        let latent = Tensor::randn([6, 6], (Kind::Float, Device::Cpu));
        let full = allocator.forward(&latent);

        // Changing the future must not change the past
        let perturbed = latent.copy();
        let _ = perturbed.get(5).fill_(42.0);
        let changed = allocator.forward(&perturbed);

        let prefix = full.narrow(0, 0, 5);
        let changed_prefix = changed.narrow(0, 0, 5);
        assert!(prefix.allclose(&changed_prefix, 1e-6, 1e-6, false));
        assert!(!full.get(5).allclose(&changed.get(5), 1e-6, 1e-6, false));
    }

    #[test]
    fn forget_gate_bias_starts_at_one() {
        let (vs, _allocator) = allocator(5);
        let variables = vs.variables();

        for (layer, hidden) in [(0, 8), (1, 4), (2, 3)] {
            let bias_ih = &variables[&format!("lstm{layer}.bias_ih_l0")];
            let bias_hh = &variables[&format!("lstm{layer}.bias_hh_l0")];
            assert_eq!(bias_ih.size(), vec![4 * hidden]);

            let ones = Tensor::ones([hidden], (Kind::Float, Device::Cpu));
            assert!(bias_ih.narrow(0, hidden, hidden).equal(&ones));
            assert_eq!(bias_ih.narrow(0, 0, hidden).abs().sum(Kind::Float).double_value(&[]), 0.0);
            assert_eq!(
                bias_ih.narrow(0, 2 * hidden, 2 * hidden).abs().sum(Kind::Float).double_value(&[]),
                0.0
            );
            assert_eq!(bias_hh.abs().sum(Kind::Float).double_value(&[]), 0.0);
            assert!(bias_ih.requires_grad());
        }
    }

    #[test]
    fn step_matches_forward() {
        let (_vs, allocator) = allocator(2);
        let latent = Tensor::randn([3, 6], (Kind::Float, Device::Cpu));
        let full = allocator.forward(&latent);

        let mut state = allocator.init_state();
        for t in 0..3 {
            let out = allocator.step(&latent.get(t).unsqueeze(0), &mut state);
            assert!(out.get(0).allclose(&full.get(t), 1e-6, 1e-6, false));
        }
    }
}
