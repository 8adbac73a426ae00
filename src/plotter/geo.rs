use std::ops::{Add, Sub};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }

    pub fn dist(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Segment {
    pub p1: Point,
    pub p2: Point,
}

impl Segment {
    pub fn new(p1: Point, p2: Point) -> Segment {
        Segment { p1, p2 }
    }

    pub fn null_len(&self) -> bool {
        self.p1 == self.p2
    }

    pub fn length(&self) -> f64 {
        self.p1.dist(&self.p2)
    }
}

/// Axis-aligned rectangle given by its lower-left and upper-right corners.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rectangle {
    pub pll: Point,
    pub pur: Point,
}

impl Rectangle {
    pub fn new(pll: Point, pur: Point) -> Rectangle {
        Rectangle { pll, pur }
    }

    pub fn contains(&self, pt: Point) -> bool {
        self.pll.x <= pt.x && pt.x <= self.pur.x && self.pll.y <= pt.y && pt.y <= self.pur.y
    }

    /// Liang-Barsky clip of `s` against the rectangle; `None` when the
    /// segment lies entirely outside.
    pub fn clip_segment(&self, s: &Segment) -> Option<Segment> {
        let p1 = f64::from(-(s.p2.x - s.p1.x));
        let p2 = -p1;
        let p3 = f64::from(-(s.p2.y - s.p1.y));
        let p4 = -p3;
        let q1 = f64::from(s.p1.x - self.pll.x);
        let q2 = f64::from(self.pur.x - s.p1.x);
        let q3 = f64::from(s.p1.y - self.pll.y);
        let q4 = f64::from(self.pur.y - s.p1.y);

        if (p1 == 0.0 && q1 < 0.0)
            || (p2 == 0.0 && q2 < 0.0)
            || (p3 == 0.0 && q3 < 0.0)
            || (p4 == 0.0 && q4 < 0.0)
        {
            // Parallel to a side and outside of it
            return None;
        }

        let mut rn1: f64 = 0.0;
        let mut rn2: f64 = 1.0;
        if p1 != 0.0 {
            let r1 = q1 / p1;
            let r2 = q2 / p2;
            if p1 < 0.0 {
                rn1 = rn1.max(r1);
                rn2 = rn2.min(r2);
            } else {
                rn1 = rn1.max(r2);
                rn2 = rn2.min(r1);
            }
        }
        if p3 != 0.0 {
            let r3 = q3 / p3;
            let r4 = q4 / p4;
            if p3 < 0.0 {
                rn1 = rn1.max(r3);
                rn2 = rn2.min(r4);
            } else {
                rn1 = rn1.max(r4);
                rn2 = rn2.min(r3);
            }
        }

        if rn1 > rn2 {
            // Entirely outside
            return None;
        }

        let xn1 = (f64::from(s.p1.x) + p2 * rn1) as i32;
        let yn1 = (f64::from(s.p1.y) + p4 * rn1) as i32;
        let xn2 = (f64::from(s.p1.x) + p2 * rn2) as i32;
        let yn2 = (f64::from(s.p1.y) + p4 * rn2) as i32;

        Some(Segment::new(Point::new(xn1, yn1), Point::new(xn2, yn2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Rectangle {
        Rectangle::new(Point::new(0, 0), Point::new(1000, 1000))
    }

    #[test]
    fn test_inside_unchanged() {
        let s = Segment::new(Point::new(10, 10), Point::new(900, 500));
        assert_eq!(window().clip_segment(&s), Some(s));
    }

    #[test]
    fn test_crossing_clipped() {
        let s = Segment::new(Point::new(-500, 500), Point::new(1500, 500));
        let c = window().clip_segment(&s).unwrap();
        assert_eq!(c, Segment::new(Point::new(0, 500), Point::new(1000, 500)));
    }

    #[test]
    fn test_outside_rejected() {
        let s = Segment::new(Point::new(-10, -10), Point::new(-500, 800));
        assert_eq!(window().clip_segment(&s), None);
        let s = Segment::new(Point::new(1200, 0), Point::new(1200, 900));
        assert_eq!(window().clip_segment(&s), None);
    }

    #[test]
    fn test_clip_result_contained() {
        let w = window();
        let cases = [
            Segment::new(Point::new(-300, -300), Point::new(1300, 1300)),
            Segment::new(Point::new(500, -900), Point::new(500, 2000)),
            Segment::new(Point::new(-100, 900), Point::new(1100, 100)),
        ];
        for s in &cases {
            let c = w.clip_segment(s).unwrap();
            assert!(w.contains(c.p1), "{:?} of {:?}", c, s);
            assert!(w.contains(c.p2), "{:?} of {:?}", c, s);
        }
    }

    #[test]
    fn test_diagonal_corner_cut() {
        let s = Segment::new(Point::new(-1000, 0), Point::new(1000, 2000));
        let c = window().clip_segment(&s).unwrap();
        assert_eq!(c.p1, Point::new(0, 1000));
        assert_eq!(c.p2, Point::new(0, 1000));
    }
}
