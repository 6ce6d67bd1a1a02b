//! Folding scored frames into a job's result.

use vscan_models::{Detection, Job};

/// Progress ceiling while a job is still running. 100 is reserved for completion.
pub const RUNNING_PROGRESS_CAP: u8 = 99;

/// A frame with its backend score, stripped of pixel data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredFrame {
    pub frame_number: u64,
    pub timestamp_seconds: f64,
    pub score: f64,
}

/// Updates a job's detections, counters and progress one batch at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Fold one batch into `job`.
    ///
    /// Frames at or above the job's threshold become detections. Every frame
    /// counts toward progress. Frames must arrive in increasing frame order.
    pub fn fold(job: &mut Job, batch: &[ScoredFrame]) {
        let threshold = job.confidence_threshold;

        for scored in batch {
            debug_assert!(
                job.detections
                    .last()
                    .map_or(true, |last| last.frame_number < scored.frame_number),
                "frames folded out of order"
            );

            if scored.score >= threshold {
                job.detections.push(Detection::new(
                    scored.frame_number,
                    scored.timestamp_seconds,
                    scored.score,
                ));
                job.violent_frame_count += 1;
            }
            job.processed_frames += 1;
        }

        Self::refresh_progress(job);
    }

    /// Record the number of frames the job will sample.
    pub fn set_total_frames(job: &mut Job, total_frames: Option<u64>) {
        job.total_frames = total_frames;
        Self::refresh_progress(job);
    }

    /// Recompute progress from processed and total frames.
    ///
    /// Without a known total the last value is kept. Progress never decreases.
    fn refresh_progress(job: &mut Job) {
        let Some(total) = job.total_frames else {
            return;
        };

        let percent = if total == 0 {
            100
        } else {
            ((job.processed_frames as f64 * 100.0) / total as f64).round() as u64
        };
        let capped = percent.min(RUNNING_PROGRESS_CAP as u64) as u8;
        job.progress = job.progress.max(capped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscan_models::{AnalysisSettings, SourceInfo};

    fn job(threshold: f64) -> Job {
        let mut job = Job::new(
            SourceInfo::Url {
                url: "https://example.com/v.mp4".into(),
            },
            &AnalysisSettings::new(threshold, 1),
        );
        job.start();
        job
    }

    fn scored(frame_number: u64, score: f64) -> ScoredFrame {
        ScoredFrame {
            frame_number,
            timestamp_seconds: frame_number as f64 / 30.0,
            score,
        }
    }

    fn count_matches(job: &Job) -> u64 {
        job.detections
            .iter()
            .filter(|d| d.confidence_score >= job.confidence_threshold)
            .count() as u64
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut job = job(0.7);
        ResultAggregator::fold(&mut job, &[scored(0, 0.7), scored(30, 0.69), scored(60, 0.95)]);

        assert_eq!(job.processed_frames, 3);
        assert_eq!(job.violent_frame_count, 2);
        assert_eq!(
            job.detections.iter().map(|d| d.frame_number).collect::<Vec<_>>(),
            vec![0, 60]
        );
        assert_eq!(job.violent_frame_count, count_matches(&job));
        assert!(job.detections.iter().all(|d| d.bounding_boxes.is_none()));
    }

    #[test]
    fn test_progress_tracks_total() {
        let mut job = job(0.5);
        ResultAggregator::set_total_frames(&mut job, Some(4));

        ResultAggregator::fold(&mut job, &[scored(0, 0.1)]);
        assert_eq!(job.progress, 25);

        ResultAggregator::fold(&mut job, &[scored(30, 0.1), scored(60, 0.1)]);
        assert_eq!(job.progress, 75);

        ResultAggregator::fold(&mut job, &[scored(90, 0.1)]);
        assert_eq!(job.progress, RUNNING_PROGRESS_CAP);

        job.complete();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_unknown_total_keeps_progress() {
        let mut job = job(0.5);
        ResultAggregator::fold(&mut job, &[scored(0, 0.9)]);
        assert_eq!(job.progress, 0);
        assert_eq!(job.processed_frames, 1);

        ResultAggregator::set_total_frames(&mut job, Some(2));
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = job(0.5);
        ResultAggregator::set_total_frames(&mut job, Some(2));
        ResultAggregator::fold(&mut job, &[scored(0, 0.1)]);
        assert_eq!(job.progress, 50);

        // a larger total must not pull progress back
        ResultAggregator::set_total_frames(&mut job, Some(10));
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_frames_past_total_stay_capped() {
        let mut job = job(0.5);
        ResultAggregator::set_total_frames(&mut job, Some(1));
        ResultAggregator::fold(&mut job, &[scored(0, 0.1), scored(30, 0.1)]);
        assert_eq!(job.progress, RUNNING_PROGRESS_CAP);
    }
}
