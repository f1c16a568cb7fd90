//! Ordered fallback parsing: the first strategy that yields a result wins

use tracing::debug;

type StrategyFn<'a, T> = Box<dyn Fn(&str) -> Option<T> + 'a>;

/// An ordered list of named parsers tried in sequence.
///
/// Each strategy returns `None` when the input is not its shape (or yields
/// nothing useful); the first `Some` is returned.
pub struct FirstMatch<'a, T> {
    label: &'static str,
    strategies: Vec<(&'static str, StrategyFn<'a, T>)>,
}

impl<'a, T> FirstMatch<'a, T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy after the existing ones
    pub fn then(mut self, name: &'static str, strategy: impl Fn(&str) -> Option<T> + 'a) -> Self {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// Run strategies in order, returning the winner's name and result
    pub fn run(&self, text: &str) -> Option<(&'static str, T)> {
        for (name, strategy) in &self.strategies {
            if let Some(result) = strategy(text) {
                debug!("{} input parsed by '{}' strategy", self.label, name);
                return Some((name, result));
            }
        }
        debug!("{} input matched none of {} strategies", self.label, self.strategies.len());
        None
    }

    /// Strategy names in the order they are tried
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(name, _)| *name).collect()
    }
}
