//! Weekly trend buckets over the lookback window

use chrono::{DateTime, Duration, Utc};

/// Maps timestamps to week indices in a window of `weeks` weeks ending at
/// `now`. Index 0 is the oldest week, `weeks - 1` the one ending at `now`.
#[derive(Debug, Clone, Copy)]
pub struct WeekBucketer {
    now: DateTime<Utc>,
    weeks: usize,
}

impl WeekBucketer {
    pub fn new(now: DateTime<Utc>, weeks: usize) -> Self {
        Self { now, weeks }
    }

    /// Enough whole weeks to cover `lookback` (rounded up, at least one).
    pub fn for_lookback(now: DateTime<Utc>, lookback: Duration) -> Self {
        let days = lookback.num_days().max(1);
        let weeks = ((days + 6) / 7) as usize;
        Self::new(now, weeks)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn weeks(&self) -> usize {
        self.weeks
    }

    /// Week `i` covers `[now - (weeks - i) * 7d, now - (weeks - i - 1) * 7d)`.
    /// Anything before the window or at/after `now` has no bucket.
    pub fn bucket(&self, at: DateTime<Utc>) -> Option<usize> {
        if at >= self.now {
            return None;
        }
        let weeks_back = (self.now - at).num_milliseconds() / Duration::weeks(1).num_milliseconds();
        let weeks_back = usize::try_from(weeks_back).ok()?;
        if weeks_back >= self.weeks {
            return None;
        }
        Some(self.weeks - 1 - weeks_back)
    }

    /// A zeroed histogram with one slot per week.
    pub fn empty_histogram(&self) -> Vec<u32> {
        vec![0; self.weeks]
    }

    /// Increment the bucket for `at`, if it has one.
    pub fn record(&self, histogram: &mut [u32], at: DateTime<Utc>) {
        if let Some(slot) = self.bucket(at).and_then(|i| histogram.get_mut(i)) {
            *slot += 1;
        }
    }
}

/// Element-wise sum of two histograms; the result is as long as the longer one.
pub fn add_histograms(a: &[u32], b: &[u32]) -> Vec<u32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0) + b.get(i).copied().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-03-29T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_bucket_edges() {
        let weeks = WeekBucketer::new(now(), 4);

        assert_eq!(weeks.bucket(now() - Duration::hours(1)), Some(3));
        assert_eq!(weeks.bucket(now() - Duration::days(7)), Some(2));
        assert_eq!(weeks.bucket(now() - Duration::days(7) + Duration::seconds(1)), Some(3));
        assert_eq!(weeks.bucket(now() - Duration::days(27)), Some(0));
        assert_eq!(weeks.bucket(now() - Duration::days(28)), None);
        assert_eq!(weeks.bucket(now()), None);
        assert_eq!(weeks.bucket(now() + Duration::days(1)), None);
    }

    #[test]
    fn test_for_lookback_rounds_up() {
        assert_eq!(WeekBucketer::for_lookback(now(), Duration::days(90)).weeks(), 13);
        assert_eq!(WeekBucketer::for_lookback(now(), Duration::days(14)).weeks(), 2);
        assert_eq!(WeekBucketer::for_lookback(now(), Duration::zero()).weeks(), 1);
    }

    #[test]
    fn test_record_ignores_out_of_window() {
        let weeks = WeekBucketer::new(now(), 2);
        let mut histogram = weeks.empty_histogram();
        weeks.record(&mut histogram, now() - Duration::days(1));
        weeks.record(&mut histogram, now() - Duration::days(8));
        weeks.record(&mut histogram, now() - Duration::days(30));
        assert_eq!(histogram, vec![1, 1]);
    }

    #[test]
    fn test_add_histograms() {
        assert_eq!(add_histograms(&[1, 2], &[3, 4]), vec![4, 6]);
        assert_eq!(add_histograms(&[], &[1]), vec![1]);
    }
}
