use tracing::{debug, info, warn};

use crate::config::AlignConfig;

/// What the reconciler knows about a line besides its token times
#[derive(Debug, Clone, Copy, Default)]
pub struct LineContext {
    /// 1-based line number, for logs
    pub line_no: usize,
    /// Trusted original timestamp of this line
    pub anchor: Option<f64>,
    /// Trusted original timestamp of the next line
    pub next_anchor: Option<f64>,
    /// Last time assigned on the previous line
    pub cursor: f64,
}

/// Per-line correction passes applied after matching.
///
/// Every pass tolerates empty, single and all-hole input.
pub struct Reconciler<'a> {
    config: &'a AlignConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a AlignConfig) -> Self {
        Self { config }
    }

    /// Run every pass on one line and return the updated running cursor
    pub fn reconcile_line(&self, times: &mut [Option<f64>], ctx: LineContext) -> f64 {
        self.remove_hallucinations(times);
        let had_matches = times.iter().any(Option::is_some);

        self.interpolate(times, ctx.cursor);

        let trusted_anchor = ctx.anchor.filter(|_| self.config.force_calibration);
        if let Some(anchor) = trusted_anchor {
            let mut calibrated = self.force_calibrate(times, anchor, had_matches, ctx.line_no);

            if let Some(next_anchor) = ctx.next_anchor {
                if !self.config.average_distribution {
                    calibrated |= self.prevent_overlap(times, anchor, next_anchor, ctx.line_no);
                }
            }

            if calibrated && self.config.average_distribution {
                self.distribute_evenly(times, anchor, ctx.next_anchor, ctx.line_no);
            }
        } else if !had_matches && !times.is_empty() {
            warn!(
                "Line {} has no matched time and no trusted timestamp; interpolating from {:.2}s",
                ctx.line_no, ctx.cursor
            );
        }

        self.enforce_order(times, ctx.cursor);

        if let Some(next_anchor) = ctx.next_anchor {
            self.enforce_boundary(times, next_anchor, ctx.line_no);
        }

        times.iter().rev().find_map(|t| *t).unwrap_or(ctx.cursor)
    }

    /// Drop a matched time when the next known time in the line is too far ahead
    pub fn remove_hallucinations(&self, times: &mut [Option<f64>]) {
        for k in 0..times.len().saturating_sub(1) {
            let Some(current) = times[k] else {
                continue;
            };
            let next_known = times[k + 1..].iter().find_map(|t| *t);
            if let Some(next) = next_known {
                if next - current > self.config.hallucination_gap {
                    debug!("Discarding spurious match at {:.2}s (next known {:.2}s)", current, next);
                    times[k] = None;
                }
            }
        }
    }

    /// Fill every hole from its neighbouring known times
    pub fn interpolate(&self, times: &mut [Option<f64>], prev_line_end: f64) {
        let cfg = self.config;

        for k in 0..times.len() {
            if times[k].is_some() {
                continue;
            }

            let prev_time = times[..k].iter().rev().find_map(|t| *t).unwrap_or(prev_line_end);
            let next = times[k + 1..]
                .iter()
                .enumerate()
                .find_map(|(holes_between, t)| t.map(|time| (time, holes_between)));

            let filled = match next {
                Some((next_time, holes_between)) => {
                    let gap = next_time - prev_time;
                    if gap > cfg.right_snap_gap {
                        // A wide gap more often means an outlier anchor than a long note
                        let back_calculated = next_time - (holes_between + 1) as f64 * cfg.right_snap_step;
                        back_calculated.max(prev_time + cfg.right_snap_floor)
                    } else {
                        let steps = (holes_between + 1) as f64;
                        let step = (gap / (steps + 1.0)).clamp(cfg.min_duration, cfg.max_interpolation_step);
                        prev_time + step
                    }
                }
                None => prev_time + cfg.left_snap_step,
            };
            times[k] = Some(filled);
        }
    }

    /// Pull the line onto its trusted timestamp. Returns whether it moved.
    pub fn force_calibrate(&self, times: &mut [Option<f64>], anchor: f64, had_matches: bool, line_no: usize) -> bool {
        if times.is_empty() {
            return false;
        }

        if !had_matches {
            warn!("Line {} [original {:.2}s] has no matched time; synthesizing from the original", line_no, anchor);
            for (k, time) in times.iter_mut().enumerate() {
                *time = Some(anchor + k as f64 * self.config.synthesized_step);
            }
            return true;
        }

        let Some(generated_start) = times.iter().find_map(|t| *t) else {
            return false;
        };
        let diff = generated_start - anchor;
        debug!(
            "Line {}: original={:.2}s, generated={:.2}s, diff={:.2}s",
            line_no, anchor, generated_start, diff
        );

        if diff.abs() <= self.config.calibration_tolerance {
            return false;
        }

        warn!("Line {} force calibrated, diff {:.2}s", line_no, diff);
        for time in times.iter_mut().flatten() {
            *time -= diff;
        }
        true
    }

    /// Compress the line when its last token runs into the next line
    pub fn prevent_overlap(&self, times: &mut [Option<f64>], anchor: f64, next_anchor: f64, line_no: usize) -> bool {
        let Some(Some(last)) = times.last().copied() else {
            return false;
        };
        if last <= next_anchor - self.config.overlap_gap {
            return false;
        }

        let start = times[0].unwrap_or(anchor);
        let mut target_end = next_anchor - self.config.overlap_gap;
        if target_end <= start {
            target_end = start + self.config.overlap_gap;
        }

        warn!("Line {} overlaps the next line; compressing to end before {:.2}s", line_no, next_anchor);
        respace(times, start, (target_end - start) / times.len() as f64);
        true
    }

    /// Discard the recognized rhythm and spread tokens evenly from the anchor
    pub fn distribute_evenly(&self, times: &mut [Option<f64>], anchor: f64, next_anchor: Option<f64>, line_no: usize) {
        let cfg = self.config;
        let count = times.len();
        if count == 0 {
            return;
        }
        info!("Line {} applying average distribution", line_no);

        let tokens = count as f64;
        let limit = next_anchor.map(|next| next - cfg.overlap_gap);
        let mut target_end = match limit {
            Some(limit) if limit - anchor >= cfg.min_average_span => limit,
            Some(_) => anchor + tokens * cfg.short_span_step,
            None => anchor + tokens * cfg.average_step,
        };

        // A slow recognized line is probably right about its length
        if let Some(Some(recognized_end)) = times.last().copied() {
            if recognized_end - anchor > tokens * cfg.slow_rate_threshold {
                let potential = target_end.max(recognized_end);
                target_end = match limit {
                    Some(limit) if potential > limit => limit,
                    _ => potential,
                };
            }
        }

        let duration = (target_end - anchor).max(cfg.min_average_span);
        respace(times, anchor, duration / tokens);
    }

    /// Make known times strictly increasing, starting after `floor`.
    /// Repeated or backward times move to the previous time plus the minimum duration.
    pub fn enforce_order(&self, times: &mut [Option<f64>], floor: f64) {
        let mut previous = floor;
        for time in times.iter_mut().flatten() {
            if *time <= previous {
                debug!("Moving {:.3}s after {:.3}s", *time, previous);
                *time = previous + self.config.min_duration;
            }
            previous = *time;
        }
    }

    /// Last line of defence: the line must end before the next line's anchor.
    /// Returns whether anything changed.
    pub fn enforce_boundary(&self, times: &mut [Option<f64>], next_anchor: f64, line_no: usize) -> bool {
        let cfg = self.config;
        let hard_limit = next_anchor - cfg.boundary_gap;

        let Some((last_idx, last_time)) = times.iter().enumerate().rev().find_map(|(i, t)| t.map(|t| (i, t)))
        else {
            return false;
        };
        if last_time <= hard_limit {
            return false;
        }

        warn!(
            "Line {} final check: end={:.3}s > next={:.3}s, compressing",
            line_no, last_time, next_anchor
        );

        let (start_idx, mut start_time) = times
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.map(|t| (i, t)))
            .unwrap_or((last_idx, last_time));
        if start_time >= hard_limit {
            start_time = hard_limit - cfg.boundary_back_off;
        }
        // Keep the compressed span wide enough that the last token stays under the limit
        if hard_limit - start_time < cfg.boundary_min_span {
            start_time = hard_limit - cfg.boundary_min_span;
        }
        let start_time = start_time.max(0.0);

        let duration = (hard_limit - start_time).max(cfg.boundary_min_span);
        let count = last_idx - start_idx + 1;
        respace(&mut times[start_idx..=last_idx], start_time, duration / count as f64);
        true
    }
}

/// Overwrite every slot with `start + k * step`
fn respace(times: &mut [Option<f64>], start: f64, step: f64) {
    for (k, time) in times.iter_mut().enumerate() {
        *time = Some(start + k as f64 * step);
    }
}
