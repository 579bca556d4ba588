/// Decides, per decoded frame, whether it reaches the renderer.
pub trait FrameDropper: Send {
    /// Called once per decoded frame, in presentation order.
    fn should_render(&mut self) -> bool;
}

/// Evenly drops frames to convert `input_fps` down to `output_fps`.
///
/// Time is accumulated in units of `1 / (input_fps * output_fps)` seconds so
/// the decision is exact: converting 30 fps to 15 fps renders every other
/// frame, for any number of frames.
///
/// ```
/// use mediaflow::{DefaultFrameDropper, FrameDropper};
///
/// let mut dropper = DefaultFrameDropper::new(30, 15);
/// let rendered: Vec<bool> = (0..4).map(|_| dropper.should_render()).collect();
/// assert_eq!(rendered, [true, false, true, false]);
/// ```
#[derive(Debug, Clone)]
pub struct DefaultFrameDropper {
    input_fps: u64,
    output_fps: u64,
    elapsed: u64,
    frame_count: u64,
}

impl DefaultFrameDropper {
    /// Create a dropper. Rates below 1 are treated as 1.
    pub fn new(input_fps: u32, output_fps: u32) -> Self {
        Self {
            input_fps: u64::from(input_fps.max(1)),
            output_fps: u64::from(output_fps.max(1)),
            elapsed: 0,
            frame_count: 0,
        }
    }

    /// Build a dropper when `target_fps` is lower than `source_fps`.
    ///
    /// A missing or sub-1 target rate means "keep the source rate", in which
    /// case no dropper is needed.
    pub fn for_rates(source_fps: Option<f32>, target_fps: Option<f32>) -> Option<Self> {
        let source = source_fps.map(|fps| fps as u32)?;
        let target = match target_fps.map(|fps| fps as u32) {
            Some(fps) if fps >= 1 => fps,
            _ => source,
        };
        (source > target).then(|| Self::new(source, target))
    }
}

impl FrameDropper for DefaultFrameDropper {
    fn should_render(&mut self) -> bool {
        // One input frame lasts `output_fps` units, one output frame `input_fps`.
        self.elapsed += self.output_fps;
        let first = self.frame_count == 0;
        self.frame_count += 1;

        if first {
            true
        } else if self.elapsed > self.input_fps {
            self.elapsed -= self.input_fps;
            true
        } else {
            false
        }
    }
}
