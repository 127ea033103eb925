use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

/// Range where lower bound is inclusive, upper bound is exclusive or unbounded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: Ord,
{
    pub fn new(from: T, to: Option<T>) -> Self {
        if let Some(ref to) = to {
            if from >= *to {
                panic!("ranges must go from low to high")
            }
        }
        Range(from, to)
    }

    pub fn contains(&self, val: &T) -> bool {
        if let Some(end) = &self.1 {
            val >= &self.0 && val < end
        } else {
            val >= &self.0
        }
    }

    pub fn start(&self) -> &T {
        &self.0
    }

    pub fn end(&self) -> Option<&T> {
        self.1.as_ref()
    }
}

impl<T> fmt::Display for Range<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(end) = &self.1 {
            write!(f, "{} - {}", self.0, end)
        } else {
            write!(f, "{}+", self.0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
}

impl<T> RangeSet<T> {
    pub fn new(ranges: Vec<Range<T>>) -> Self {
        Self { ranges }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<T>> + '_ {
        self.ranges.iter()
    }

}

impl<T> RangeSet<T>
where
    T: Ord,
{
    /// Add each weight to every range containing its key.
    pub fn bucket_sums<I, B>(self, values: I) -> RangeSetTotals<T>
    where
        I: Iterator<Item = (B, u64)>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0u64; self.ranges.len()];
        for (key, weight) in values {
            for (idx, bucket) in self.ranges.iter().enumerate() {
                if bucket.contains(key.borrow()) {
                    buckets[idx] += weight;
                }
            }
        }
        RangeSetTotals {
            set: self,
            totals: buckets,
        }
    }
}

impl RangeSet<u16> {
    /// Consecutive spans of `width` years covering `first..=last`. The final span may be shorter.
    pub fn year_periods(first: u16, last: u16, width: u16) -> Self {
        let width = u32::from(width.max(1));
        let stop = u32::from(last) + 1;
        let mut ranges = vec![];
        let mut start = u32::from(first);
        while start < stop {
            let end = (start + width).min(stop);
            // an end past u16::MAX means the span runs to the last representable year
            ranges.push(Range::new(start as u16, u16::try_from(end).ok()));
            start = end;
        }
        Self::new(ranges)
    }
}

/// A range set with values bucketed, and bucket totals recorded.
#[derive(Debug, Clone)]
pub struct RangeSetTotals<T> {
    set: RangeSet<T>,
    totals: Vec<u64>,
}

impl<T> RangeSetTotals<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&Range<T>, u64)> {
        self.set.iter().zip_eq(self.totals.iter().copied())
    }
}

#[cfg(test)]
mod test {
    use super::{Range, RangeSet};

    #[test]
    fn year_periods() {
        let periods = RangeSet::year_periods(1994, 2018, 5);
        let spans: Vec<_> = periods.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            spans,
            [
                "1994 - 1999",
                "1999 - 2004",
                "2004 - 2009",
                "2009 - 2014",
                "2014 - 2019"
            ]
        );
    }

    #[test]
    fn year_periods_at_max_year() {
        let periods = RangeSet::year_periods(u16::MAX - 6, u16::MAX, 5);
        let spans: Vec<_> = periods.iter().map(|r| r.to_string()).collect();
        assert_eq!(spans, ["65529 - 65534", "65534+"]);
        assert!(periods.iter().last().unwrap().contains(&u16::MAX));
    }

    #[test]
    fn sums() {
        let totals = RangeSet::new(vec![Range::new(0u16, Some(10)), Range::new(10, None)])
            .bucket_sums([(1u16, 5), (9, 1), (10, 7), (100, 1)].into_iter());
        let out: Vec<_> = totals.iter().map(|(_, total)| total).collect();
        assert_eq!(out, [6, 8]);
    }
}
