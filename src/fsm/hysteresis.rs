//! Ring-buffer N-of-M hysteresis: a boolean state that only flips once a majority of the last
//! `window` samples cross the relevant enter/exit threshold, smoothing out single noisy frames.

#[derive(Debug, Clone)]
pub struct HysteresisGate {
    enter: f64,
    exit: f64,
    need: usize,
    window: usize,
    state: bool,
    buf: Vec<f64>,
}

impl HysteresisGate {
    pub fn new(enter: f64, exit: f64, need: usize, window: usize) -> Self {
        Self {
            enter,
            exit,
            need,
            window,
            state: false,
            buf: Vec::with_capacity(window),
        }
    }

    /// Feeds a new sample, returning the gate's current (possibly just-updated) boolean state.
    pub fn feed(&mut self, x: f64) -> bool {
        self.buf.push(x);
        if self.buf.len() > self.window {
            self.buf.remove(0);
        }

        let ok = self
            .buf
            .iter()
            .filter(|&&v| if !self.state { v >= self.enter } else { v <= self.exit })
            .count();

        if !self.state {
            if ok >= self.need {
                self.state = true;
            }
        } else if ok >= self.need {
            self.state = false;
        }

        self.state
    }

    pub fn reset(&mut self, state: bool) {
        self.state = state;
        self.buf.clear();
    }

    pub fn state(&self) -> bool {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_consecutive_confirmations_to_enter() {
        let mut gate = HysteresisGate::new(0.65, 0.35, 3, 5);
        assert!(!gate.feed(0.9));
        assert!(!gate.feed(0.9));
        assert!(gate.feed(0.9));
    }

    #[test]
    fn single_low_sample_does_not_immediately_exit() {
        let mut gate = HysteresisGate::new(0.65, 0.35, 3, 5);
        for _ in 0..3 {
            gate.feed(0.9);
        }
        assert!(gate.state());
        gate.feed(0.2);
        assert!(gate.state());
    }
}
