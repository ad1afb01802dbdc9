/// Bounded repetition: `^[count][separator][content]`.

/// One active repeater. Spans are char indices into the expanded text;
/// the `*_end` fields point at the closing `]` of each block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeaterInstance {
    pub content_start: usize,
    pub content_end: usize,
    pub sep_start: usize,
    pub sep_end: usize,
    pub max_iterations: u32,
    pub iterations_done: u32,
    pub on_separator: bool,
}

impl RepeaterInstance {
    /// The 1-based iteration currently running (or about to run).
    pub fn current_iteration(&self) -> u32 {
        self.iterations_done + 1
    }

    /// `(flag prefix, is set)` for the iteration about to run.
    pub fn iteration_flags(&self) -> [(&'static str, bool); 4] {
        let n = self.current_iteration();
        [
            ("first", n == 1),
            ("last", n == self.max_iterations),
            ("odd", n % 2 == 1),
            ("even", n % 2 == 0),
        ]
    }
}

/// What the interpreter should do after a `]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeaterStep {
    /// Jump to the separator block.
    EnterSeparator(usize),
    /// Jump to the start of the next iteration's content.
    EnterContent(usize),
    /// Last iteration done; the instance was popped at this nesting depth.
    Finished { depth: usize },
    /// The `]` closes something else.
    NotABoundary,
}

/// Stack of active repeaters, innermost last.
#[derive(Debug, Clone, Default)]
pub struct RepeaterTracker {
    stack: Vec<RepeaterInstance>,
}

impl RepeaterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a repeater and return its nesting depth (1 for the outermost).
    pub fn push(&mut self, instance: RepeaterInstance) -> usize {
        self.stack.push(instance);
        self.stack.len()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&RepeaterInstance> {
        self.stack.last()
    }

    /// Advance the innermost repeater for a `]` read at `index`.
    pub fn on_close(&mut self, index: usize) -> RepeaterStep {
        let depth = self.stack.len();
        let Some(top) = self.stack.last_mut() else {
            return RepeaterStep::NotABoundary;
        };

        if !top.on_separator && index == top.content_end {
            top.iterations_done += 1;
            if top.iterations_done >= top.max_iterations {
                self.stack.pop();
                return RepeaterStep::Finished { depth };
            }
            if top.sep_start < top.sep_end {
                top.on_separator = true;
                return RepeaterStep::EnterSeparator(top.sep_start);
            }
            return RepeaterStep::EnterContent(top.content_start);
        }

        if top.on_separator && index == top.sep_end {
            top.on_separator = false;
            return RepeaterStep::EnterContent(top.content_start);
        }

        RepeaterStep::NotABoundary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ^[3][, ][X]
    // 01234567890
    fn make(max: u32) -> RepeaterInstance {
        RepeaterInstance {
            content_start: 9,
            content_end: 10,
            sep_start: 5,
            sep_end: 7,
            max_iterations: max,
            iterations_done: 0,
            on_separator: false,
        }
    }

    #[test]
    fn cycles_content_and_separator() {
        let mut tracker = RepeaterTracker::new();
        assert_eq!(tracker.push(make(3)), 1);

        assert_eq!(tracker.on_close(10), RepeaterStep::EnterSeparator(5));
        assert_eq!(tracker.on_close(7), RepeaterStep::EnterContent(9));
        assert_eq!(tracker.on_close(10), RepeaterStep::EnterSeparator(5));
        assert_eq!(tracker.on_close(7), RepeaterStep::EnterContent(9));
        assert_eq!(tracker.on_close(10), RepeaterStep::Finished { depth: 1 });
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn unrelated_bracket_is_not_a_boundary() {
        let mut tracker = RepeaterTracker::new();
        tracker.push(make(2));
        assert_eq!(tracker.on_close(3), RepeaterStep::NotABoundary);
        // The separator end only counts while in the separator phase.
        assert_eq!(tracker.on_close(7), RepeaterStep::NotABoundary);
        assert_eq!(tracker.top().unwrap().iterations_done, 0);
    }

    #[test]
    fn empty_separator_is_skipped() {
        let mut tracker = RepeaterTracker::new();
        let mut inst = make(2);
        inst.sep_start = 5;
        inst.sep_end = 5;
        tracker.push(inst);
        assert_eq!(tracker.on_close(10), RepeaterStep::EnterContent(9));
    }

    #[test]
    fn iteration_flags_track_position() {
        let mut inst = make(3);
        assert_eq!(
            inst.iteration_flags(),
            [("first", true), ("last", false), ("odd", true), ("even", false)]
        );
        inst.iterations_done = 1;
        assert_eq!(
            inst.iteration_flags(),
            [("first", false), ("last", false), ("odd", false), ("even", true)]
        );
        inst.iterations_done = 2;
        assert_eq!(
            inst.iteration_flags(),
            [("first", false), ("last", true), ("odd", true), ("even", false)]
        );
    }

    #[test]
    fn empty_stack_has_no_boundaries() {
        let mut tracker = RepeaterTracker::new();
        assert_eq!(tracker.on_close(0), RepeaterStep::NotABoundary);
    }
}
