// tests/rect_algebra.rs

use proptest::prelude::*;

use dagrt::memory::{Rect, RectSet};

fn line(offset: usize, len: usize) -> Rect {
    Rect::new([offset, 0, 0], [len, 1, 1])
}

#[test]
fn intersection_of_disjoint_boxes_is_none() {
    assert_eq!(line(0, 4).intersection(&line(4, 4)), None);
    assert_eq!(line(0, 4).intersection(&line(2, 4)), Some(line(2, 2)));
}

#[test]
fn subtract_middle_leaves_two_slabs() {
    let pieces = line(0, 10).subtract(&line(3, 4));
    assert_eq!(pieces, vec![line(0, 3), line(7, 3)]);
}

#[test]
fn subtract_centre_of_cube_yields_six_pieces() {
    let cube = Rect::new([0, 0, 0], [3, 3, 3]);
    let centre = Rect::new([1, 1, 1], [1, 1, 1]);

    let pieces = cube.subtract(&centre);
    assert_eq!(pieces.len(), 6);
    assert_eq!(pieces.iter().map(Rect::volume).sum::<usize>(), 26);
    assert!(pieces.iter().all(|p| !p.overlaps(&centre)));
}

#[test]
fn merge_requires_a_shared_face() {
    let a = Rect::new([0, 0, 0], [2, 2, 1]);
    let b = Rect::new([2, 0, 0], [2, 2, 1]);
    let c = Rect::new([2, 1, 0], [2, 2, 1]);

    assert_eq!(a.merge(&b), Some(Rect::new([0, 0, 0], [4, 2, 1])));
    assert_eq!(a.merge(&c), None);
}

#[test]
fn adjacent_inserts_coalesce_into_one_box() {
    let mut set = RectSet::new();
    set.insert(line(4, 4));
    set.insert(line(0, 4));
    assert_eq!(set.rects(), &[line(0, 8)]);
}

#[test]
fn remove_splits_and_uncovered_reports_the_hole() {
    let mut set = RectSet::new();
    set.insert(line(0, 8));
    set.remove(&line(2, 2));

    assert_eq!(set.rects(), &[line(0, 2), line(4, 4)]);
    assert_eq!(set.uncovered(&line(0, 8)), vec![line(2, 2)]);
    assert!(set.covers(&line(4, 3)));
    assert!(!set.covers(&line(1, 2)));
}

#[test]
fn empty_window_is_always_covered() {
    let set = RectSet::new();
    assert!(set.covers(&Rect::new([3, 0, 0], [0, 1, 1])));
    assert!(set.uncovered(&Rect::new([3, 0, 0], [0, 1, 1])).is_empty());
}

fn small_rect() -> impl Strategy<Value = Rect> {
    (0..6usize, 0..6usize, 0..3usize, 1..5usize, 1..5usize, 1..3usize)
        .prop_map(|(x, y, z, w, h, d)| Rect::new([x, y, z], [w, h, d]))
}

fn contains_point(rects: &[Rect], p: [usize; 3]) -> bool {
    rects
        .iter()
        .any(|r| r.contains(&Rect::new(p, [1, 1, 1])))
}

proptest! {
    #[test]
    fn subtract_partitions_the_difference(a in small_rect(), b in small_rect()) {
        let pieces = a.subtract(&b);

        for (i, p) in pieces.iter().enumerate() {
            prop_assert!(a.contains(p));
            prop_assert!(!p.overlaps(&b));
            for q in pieces.iter().skip(i + 1) {
                prop_assert!(!p.overlaps(q));
            }
        }

        let overlap = a.intersection(&b).map(|r| r.volume()).unwrap_or(0);
        let total: usize = pieces.iter().map(Rect::volume).sum();
        prop_assert_eq!(total + overlap, a.volume());
    }

    #[test]
    fn set_matches_pointwise_model(
        ops in proptest::collection::vec((any::<bool>(), small_rect()), 1..12),
        window in small_rect(),
    ) {
        let mut set = RectSet::new();
        for (insert, rect) in ops.iter() {
            if *insert {
                set.insert(*rect);
            } else {
                set.remove(rect);
            }
        }

        // Disjoint.
        for (i, p) in set.rects().iter().enumerate() {
            for q in set.rects().iter().skip(i + 1) {
                prop_assert!(!p.overlaps(q));
            }
        }

        let uncovered = set.uncovered(&window);
        for x in 0..10 {
            for y in 0..10 {
                for z in 0..5 {
                    let p = [x, y, z];
                    let expected = ops.iter().fold(false, |inside, (insert, rect)| {
                        if rect.contains(&Rect::new(p, [1, 1, 1])) { *insert } else { inside }
                    });
                    prop_assert_eq!(contains_point(set.rects(), p), expected);

                    let in_window = window.contains(&Rect::new(p, [1, 1, 1]));
                    prop_assert_eq!(contains_point(&uncovered, p), in_window && !expected);
                }
            }
        }
    }
}
