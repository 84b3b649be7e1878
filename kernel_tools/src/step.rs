pub struct MultStep {
    factor: usize,
    next: usize,
}

impl Iterator for MultStep {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next;
        self.next *= self.factor;
        Some(next)
    }
}

// Returns an iterator that generates numbers by multiplying by the given
// factor.
pub fn mult_step(init: usize, factor: usize) -> MultStep {
    MultStep { factor, next: init }
}

/// The shift distances of a ladder scan over `width` lanes: 1, 2, 4, ...,
/// `width / 2`.
pub fn ladder_shifts(width: usize) -> impl Iterator<Item = usize> {
    mult_step(1, 2).take_while(move |&s| s < width)
}
