//! Tile layout for the call page.
//!
//! Positions publisher and subscriber tiles inside the layout container.
//! Screen shares are "big" tiles: when any exist they share a large area
//! and every other tile is packed into the remaining strip.
//!
//! Ratios are height / width. A grid cell is never taller than `max_ratio`
//! or flatter than `min_ratio` times its width.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Window resize debounce.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(20);

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// A tile to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSpec {
    pub id: String,
    pub big: bool,
}

impl TileSpec {
    pub fn new(id: impl Into<String>, big: bool) -> Self {
        Self { id: id.into(), big }
    }
}

/// Computed position of one tile, relative to the container.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePlacement {
    pub id: String,
    pub big: bool,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Layout tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub max_ratio: f64,
    pub min_ratio: f64,
    /// Share of the container given to big tiles.
    pub big_percentage: f64,
    /// Place the big area before (left of / above) the small tiles.
    pub big_first: bool,
    /// Let a short last row grow to use the freed width.
    pub scale_last_row: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_ratio: 3.0 / 2.0,
            min_ratio: 9.0 / 16.0,
            big_percentage: 0.8,
            big_first: true,
            scale_last_row: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Area {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Clone, Copy)]
struct Grid {
    cols: usize,
    rows: usize,
    cell_width: f64,
    cell_height: f64,
}

/// Pure layout calculator.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    options: LayoutOptions,
}

impl LayoutEngine {
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Place `tiles` inside `container`. Output order matches input order.
    pub fn compute(&self, container: Size, tiles: &[TileSpec]) -> Vec<TilePlacement> {
        if tiles.is_empty() {
            return Vec::new();
        }
        if container.is_empty() {
            return tiles
                .iter()
                .map(|tile| TilePlacement {
                    id: tile.id.clone(),
                    big: tile.big,
                    left: 0.0,
                    top: 0.0,
                    width: 0.0,
                    height: 0.0,
                })
                .collect();
        }

        let (big, small): (Vec<usize>, Vec<usize>) =
            (0..tiles.len()).partition(|&i| tiles.get(i).is_some_and(|t| t.big));

        let whole = Area {
            left: 0.0,
            top: 0.0,
            width: container.width,
            height: container.height,
        };

        let mut rects: Vec<Option<Area>> = vec![None; tiles.len()];

        if big.is_empty() || small.is_empty() {
            let all: Vec<usize> = (0..tiles.len()).collect();
            self.place_grid(whole, &all, &mut rects);
        } else {
            let (big_area, small_area) = self.split(whole);
            self.place_grid(big_area, &big, &mut rects);
            self.place_grid(small_area, &small, &mut rects);
        }

        tiles
            .iter()
            .zip(rects)
            .map(|(tile, rect)| {
                let rect = rect.unwrap_or(Area {
                    left: 0.0,
                    top: 0.0,
                    width: 0.0,
                    height: 0.0,
                });
                TilePlacement {
                    id: tile.id.clone(),
                    big: tile.big,
                    left: rect.left,
                    top: rect.top,
                    width: rect.width,
                    height: rect.height,
                }
            })
            .collect()
    }

    /// Split the container into the big area and the small strip.
    fn split(&self, whole: Area) -> (Area, Area) {
        let pct = self.options.big_percentage;
        if whole.width > whole.height {
            let big_width = (whole.width * pct).floor();
            let small_width = whole.width - big_width;
            let (big_left, small_left) = if self.options.big_first {
                (whole.left, whole.left + big_width)
            } else {
                (whole.left + small_width, whole.left)
            };
            (
                Area {
                    left: big_left,
                    top: whole.top,
                    width: big_width,
                    height: whole.height,
                },
                Area {
                    left: small_left,
                    top: whole.top,
                    width: small_width,
                    height: whole.height,
                },
            )
        } else {
            let big_height = (whole.height * pct).floor();
            let small_height = whole.height - big_height;
            let (big_top, small_top) = if self.options.big_first {
                (whole.top, whole.top + big_height)
            } else {
                (whole.top + small_height, whole.top)
            };
            (
                Area {
                    left: whole.left,
                    top: big_top,
                    width: whole.width,
                    height: big_height,
                },
                Area {
                    left: whole.left,
                    top: small_top,
                    width: whole.width,
                    height: small_height,
                },
            )
        }
    }

    /// Choose the column count that gives tiles the most total area.
    fn best_grid(&self, area: Area, count: usize) -> Grid {
        let mut best: Option<(f64, Grid)> = None;

        for cols in 1..=count {
            let rows = count.div_ceil(cols);
            let mut cell_width = (area.width / cols as f64).floor();
            let mut cell_height = (area.height / rows as f64).floor();

            let ratio = cell_height / cell_width;
            if ratio > self.options.max_ratio {
                cell_height = (cell_width * self.options.max_ratio).floor();
            } else if ratio < self.options.min_ratio {
                cell_width = (cell_height / self.options.min_ratio).floor();
            }

            let total = cell_width * cell_height * count as f64;
            let grid = Grid {
                cols,
                rows,
                cell_width,
                cell_height,
            };

            // Strictly greater: ties keep the smaller column count.
            if best.map_or(true, |(area, _)| total > area) {
                best = Some((total, grid));
            }
        }

        best.map(|(_, grid)| grid).unwrap_or(Grid {
            cols: 1,
            rows: 1,
            cell_width: area.width,
            cell_height: area.height,
        })
    }

    fn place_grid(&self, area: Area, indices: &[usize], rects: &mut [Option<Area>]) {
        if indices.is_empty() {
            return;
        }

        let grid = self.best_grid(area, indices.len());
        let grid_height = grid.cell_height * grid.rows as f64;
        let mut top = area.top + ((area.height - grid_height) / 2.0).floor();

        for (row_index, row) in indices.chunks(grid.cols).enumerate() {
            let is_last = row_index + 1 == grid.rows;
            let mut width = grid.cell_width;

            if is_last && self.options.scale_last_row && row.len() < grid.cols {
                // Grow into the freed width without getting flatter than min_ratio.
                let max_width = (grid.cell_height / self.options.min_ratio).floor();
                width = (area.width / row.len() as f64).floor().min(max_width).max(width);
            }

            let row_width = width * row.len() as f64;
            let mut left = area.left + ((area.width - row_width) / 2.0).floor();

            for &index in row {
                if let Some(slot) = rects.get_mut(index) {
                    *slot = Some(Area {
                        left,
                        top,
                        width,
                        height: grid.cell_height,
                    });
                }
                left += width;
            }
            top += grid.cell_height;
        }
    }
}

/// Trailing-edge debounce timer.
///
/// Every `schedule` pushes the deadline out by the full delay; `wait`
/// resolves once the deadline passes without another `schedule`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the pending deadline. Never resolves when nothing is pending.
    ///
    /// Cancel safe: dropping the future keeps the deadline.
    pub async fn wait(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// One fixed-delay timer per `schedule` call.
///
/// Unlike [`Debouncer`], a later `schedule` never moves an earlier deadline:
/// each call fires once, `delay` after it was made.
#[derive(Debug)]
pub struct DelayQueue {
    delay: Duration,
    deadlines: VecDeque<Instant>,
}

impl DelayQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: VecDeque::new(),
        }
    }

    pub fn schedule(&mut self) {
        self.deadlines.push_back(Instant::now() + self.delay);
    }

    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }

    /// Wait for the earliest deadline. Never resolves when nothing is pending.
    ///
    /// Cancel safe: the deadline is only consumed once it has passed.
    pub async fn wait(&mut self) {
        match self.deadlines.front().copied() {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadlines.pop_front();
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tiles(small: usize, big: usize) -> Vec<TileSpec> {
        let mut out: Vec<TileSpec> = (0..small)
            .map(|i| TileSpec::new(format!("s{i}"), false))
            .collect();
        out.extend((0..big).map(|i| TileSpec::new(format!("b{i}"), true)));
        out
    }

    fn inside(p: &TilePlacement, c: Size) -> bool {
        p.left >= 0.0 && p.top >= 0.0 && p.left + p.width <= c.width && p.top + p.height <= c.height
    }

    fn overlaps(a: &TilePlacement, b: &TilePlacement) -> bool {
        a.left < b.left + b.width
            && b.left < a.left + a.width
            && a.top < b.top + b.height
            && b.top < a.top + a.height
    }

    #[test]
    fn test_empty() {
        let engine = LayoutEngine::default();
        assert!(engine.compute(Size::new(1280.0, 720.0), &[]).is_empty());
    }

    #[test]
    fn test_single_tile_fills_within_ratio() {
        let engine = LayoutEngine::default();
        let container = Size::new(1280.0, 720.0);
        let placements = engine.compute(container, &tiles(1, 0));

        let p = placements.first().unwrap();
        assert_eq!(p.width, 1280.0);
        assert_eq!(p.height, 720.0);
        assert_eq!((p.left, p.top), (0.0, 0.0));
    }

    #[test]
    fn test_tall_container_caps_ratio() {
        let engine = LayoutEngine::default();
        let placements = engine.compute(Size::new(400.0, 1000.0), &tiles(1, 0));

        let p = placements.first().unwrap();
        assert_eq!(p.width, 400.0);
        assert_eq!(p.height, 600.0);
        // Centred vertically.
        assert_eq!(p.top, 200.0);
    }

    #[test]
    fn test_two_tiles_side_by_side_in_landscape() {
        let engine = LayoutEngine::default();
        let placements = engine.compute(Size::new(1280.0, 720.0), &tiles(2, 0));

        assert_eq!(placements.len(), 2);
        let (a, b) = (placements.first().unwrap(), placements.get(1).unwrap());
        assert_eq!(a.top, b.top);
        assert!(a.left < b.left);
        assert!(!overlaps(a, b));
    }

    #[test]
    fn test_short_last_row_is_scaled_and_centred() {
        let engine = LayoutEngine::default();
        let container = Size::new(1200.0, 800.0);
        let placements = engine.compute(container, &tiles(3, 0));

        for p in &placements {
            assert!(inside(p, container), "{p:?} outside container");
        }
        let last = placements.last().unwrap();
        let first = placements.first().unwrap();
        if last.top > first.top {
            assert!(last.width >= first.width);
            let centre = last.left + last.width / 2.0;
            assert!((centre - container.width / 2.0).abs() <= 1.0);
        }
    }

    #[test]
    fn test_no_overlap_and_within_bounds() {
        let engine = LayoutEngine::default();
        for n in 1..=12 {
            for container in [Size::new(1280.0, 720.0), Size::new(720.0, 1280.0), Size::new(960.0, 540.0)] {
                let placements = engine.compute(container, &tiles(n, 0));
                assert_eq!(placements.len(), n);
                for (i, a) in placements.iter().enumerate() {
                    assert!(inside(a, container), "n={n} {a:?} outside {container:?}");
                    let ratio = a.height / a.width;
                    assert!(ratio <= engine.options().max_ratio + 1e-9);
                    for b in placements.iter().skip(i + 1) {
                        assert!(!overlaps(a, b), "n={n} {a:?} overlaps {b:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_big_tile_takes_left_area_in_landscape() {
        let engine = LayoutEngine::default();
        let container = Size::new(1000.0, 600.0);
        let placements = engine.compute(container, &tiles(2, 1));

        let big = placements.iter().find(|p| p.big).unwrap();
        assert!(big.left + big.width <= 800.0);
        for small in placements.iter().filter(|p| !p.big) {
            assert!(small.left >= 800.0);
            assert!(inside(small, container));
        }
    }

    #[test]
    fn test_big_tile_takes_top_area_in_portrait() {
        let engine = LayoutEngine::default();
        let container = Size::new(600.0, 1000.0);
        let placements = engine.compute(container, &tiles(2, 1));

        let big = placements.iter().find(|p| p.big).unwrap();
        assert!(big.top + big.height <= 800.0);
        for small in placements.iter().filter(|p| !p.big) {
            assert!(small.top >= 800.0);
        }
    }

    #[test]
    fn test_only_big_tiles_use_whole_container() {
        let engine = LayoutEngine::default();
        let placements = engine.compute(Size::new(1280.0, 720.0), &tiles(0, 1));
        assert_eq!(placements.first().unwrap().width, 1280.0);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let engine = LayoutEngine::default();
        let container = Size::new(1366.0, 768.0);
        let specs = tiles(5, 1);

        let first = engine.compute(container, &specs);
        let second = engine.compute(container, &specs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_order_matches_input() {
        let engine = LayoutEngine::default();
        let specs = vec![
            TileSpec::new("a", false),
            TileSpec::new("screen", true),
            TileSpec::new("b", false),
        ];
        let ids: Vec<String> = engine
            .compute(Size::new(1280.0, 720.0), &specs)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["a", "screen", "b"]);
    }

    #[test]
    fn test_zero_container() {
        let engine = LayoutEngine::default();
        let placements = engine.compute(Size::default(), &tiles(2, 0));
        assert!(placements.iter().all(|p| p.width == 0.0 && p.height == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_fires_once_after_quiet_period() {
        let mut debouncer = Debouncer::new(RESIZE_DEBOUNCE);
        assert!(!debouncer.is_pending());

        let start = Instant::now();
        debouncer.schedule();
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.schedule();

        debouncer.wait().await;
        assert!(!debouncer.is_pending());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_queue_is_not_pushed_out() {
        let delay = Duration::from_millis(200);
        let mut queue = DelayQueue::new(delay);

        let start = Instant::now();
        queue.schedule();
        tokio::time::advance(Duration::from_millis(150)).await;
        queue.schedule();
        assert_eq!(queue.pending(), 2);

        queue.wait().await;
        assert!(start.elapsed() >= delay);
        assert!(start.elapsed() < Duration::from_millis(350));
        assert_eq!(queue.pending(), 1);

        queue.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(350));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_without_schedule_never_fires() {
        let mut debouncer = Debouncer::new(RESIZE_DEBOUNCE);
        let fired = tokio::time::timeout(Duration::from_secs(1), debouncer.wait()).await;
        assert!(fired.is_err());
    }
}
