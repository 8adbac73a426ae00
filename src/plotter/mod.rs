/*! HP9872 plotter core.

The coordinate model, P1/P2 scaling, window clipping, line-type
patterning, the firmware-derived text engine and the status/error model.
The core consumes remotizer events carrying HPGL text and emits clipped
segments through a [`PlotterPort`].
*/

mod font;
mod geo;

pub use self::font::{glyph, translate_code, Glyph, FONT};
pub use self::geo::{Point, Rectangle, Segment};

use crate::hpgl::{Arg, Command, Parser};
use crate::remotizer::Event;
use tracing::*;

// Physical limits (plotter units)
pub const MIN_X_PHY: i32 = 0;
pub const MAX_X_PHY: i32 = 16000;
pub const MIN_Y_PHY: i32 = 0;
pub const MAX_Y_PHY: i32 = 11400;

// Default P1/P2
pub const DEF_X_P1: i32 = 520;
pub const DEF_Y_P1: i32 = 380;
pub const DEF_X_P2: i32 = 15720;
pub const DEF_Y_P2: i32 = 10380;

// Reset position
const RST_X: i32 = 16000;
const RST_Y: i32 = 0;

// "Impossible" pen position
const NO_PEN: Point = Point::new(65535, 65535);

// Integer argument limits
const MAX_INT_NO_SC: i64 = 32767;
const MIN_INT_SC: i64 = -16383;
const MAX_INT_SC: i64 = 16383;

// Decimal argument limits
const MIN_DEC: f64 = -127.999;
const MAX_DEC: f64 = 127.999;
const MAX_ABS_DEC: i64 = 127;

/// Line type patterns: alternating draw/gap percentages
static LT_PATTERNS: [&[i64]; 6] = [
    &[0, 100],
    &[50, 50],
    &[70, 30],
    &[80, 10, 0, 10],
    &[70, 10, 10, 10],
    &[50, 10, 10, 10, 10, 10],
];

const LT_SOLID: i32 = -1;
const LT_2_POINTS: i32 = 0;

/// Everything the plotter core pushes towards its surroundings: segments
/// to draw, front-panel LEDs and the HPIB-side status plumbing.
pub trait PlotterPort {
    fn draw_segment(&mut self, p1: Point, p2: Point, pen: u8);
    /// 0 = in window, 1 = nearby, 2 = far away
    fn set_ol_led(&mut self, zone: u8);
    fn set_error_led(&mut self, on: bool);
    fn set_status_byte(&mut self, b: u8);
    fn set_pp_state(&mut self, on: bool);
    fn set_rsv_state(&mut self, on: bool);
    fn talk_data(&mut self, data: &[u8]);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PenZone {
    InWindow,
    Nearby,
    Faraway,
}

/// HPGL error kinds, by status bit position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CmdError {
    WrongNumArgs,
    InvalidArg,
    InvalidChar,
    UnknownCharSet,
    PosOverflow,
}

impl CmdError {
    fn number(self) -> u8 {
        match self {
            CmdError::WrongNumArgs => 2,
            CmdError::InvalidArg => 3,
            CmdError::InvalidChar => 4,
            CmdError::UnknownCharSet => 5,
            CmdError::PosOverflow => 6,
        }
    }
}

type CmdResult = Result<Option<String>, CmdError>;

fn truncate_half_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

pub struct Plotter<P: PlotterPort> {
    io: P,
    parser: Parser,
    output: Option<Vec<u8>>,
    pen_no: u8,

    status: u8,
    err_no: u8,
    pp_accum: u8,
    srq_accum: u8,
    set_in_masks: [u8; 3],

    scaling: Option<Rectangle>,
    window: Rectangle,
    p1: Point,
    p2: Point,

    line_type: i32,
    line_type_pct: f64,
    line_pat_idx: i32,
    line_pat_rem: i64,

    text_size: (f64, f64),
    text_size_rel: bool,
    text_dir: (f64, f64),
    text_dir_rel: bool,
    text_direction: (f64, f64),
    text_drawing: bool,
    text_sets: [u8; 2],
    text_cur_set: usize,
    text_slant: f64,
    text_symbol: Option<u8>,
    text_char_width: i32,
    text_char_height: i32,
    text_ref_point: Point,
    char_offset: (f64, f64),
    pos_in_cell: (i32, i32),
    neg_tick: f64,
    pos_tick: f64,

    pen: Point,
    last_pen: Point,
    scaled_pen: Point,
    pen_zone: PenZone,
    last_pen_draw: Point,
    last_pen_down: Point,
    cmd_pen_down: bool,
    pen_down: bool,
}

impl<P: PlotterPort> Plotter<P> {
    pub fn new(io: P) -> Plotter<P> {
        let mut plotter = Plotter {
            io,
            parser: Parser::new(),
            output: None,
            pen_no: 1,
            status: 0,
            err_no: 0,
            pp_accum: 0,
            srq_accum: 0,
            set_in_masks: [223, 0, 0],
            scaling: None,
            window: Rectangle::new(
                Point::new(MIN_X_PHY, MIN_Y_PHY),
                Point::new(MAX_X_PHY, MAX_Y_PHY),
            ),
            p1: Point::new(DEF_X_P1, DEF_Y_P1),
            p2: Point::new(DEF_X_P2, DEF_Y_P2),
            line_type: LT_SOLID,
            line_type_pct: 4.0,
            line_pat_idx: -1,
            line_pat_rem: 0,
            text_size: (0.0075, 0.015),
            text_size_rel: true,
            text_dir: (1.0, 0.0),
            text_dir_rel: true,
            text_direction: (1.0, 0.0),
            text_drawing: false,
            text_sets: [0, 0],
            text_cur_set: 0,
            text_slant: 0.0,
            text_symbol: None,
            text_char_width: 1,
            text_char_height: 1,
            text_ref_point: Point::new(0, 0),
            char_offset: (0.0, 0.0),
            pos_in_cell: (0, 0),
            neg_tick: 0.005,
            pos_tick: 0.005,
            pen: Point::new(RST_X, RST_Y),
            last_pen: Point::new(RST_X, RST_Y),
            scaled_pen: Point::new(RST_X, RST_Y),
            pen_zone: PenZone::InWindow,
            last_pen_draw: NO_PEN,
            last_pen_down: NO_PEN,
            cmd_pen_down: false,
            pen_down: false,
        };
        plotter.initialize();
        plotter
    }

    pub fn io(&mut self) -> &mut P {
        &mut self.io
    }

    fn clear_status(&mut self) {
        self.pp_accum = 0;
        self.srq_accum = 0;
        self.io.set_rsv_state(false);
        self.io.set_pp_state(false);
        self.status = 0;
        self.set_in_masks = [223, 0, 0];
        // Ready for data
        self.set_status_1(0x10);
    }

    fn set_defaults(&mut self) {
        self.scaling = None;
        self.set_in_masks = [223, 0, 0];
        self.text_size = (0.0075, 0.015);
        self.text_size_rel = true;
        self.text_dir = (1.0, 0.0);
        self.text_dir_rel = true;
        self.text_drawing = false;
        self.window = Rectangle::new(
            Point::new(MIN_X_PHY, MIN_Y_PHY),
            Point::new(MAX_X_PHY, MAX_Y_PHY),
        );
        self.line_type = LT_SOLID;
        self.line_type_pct = 4.0;
        self.text_sets = [0, 0];
        self.text_cur_set = 0;
        self.text_slant = 0.0;
        self.text_symbol = None;
        self.neg_tick = 0.005;
        self.pos_tick = 0.005;
        self.compute_text_dir();
        self.text_char_width = 1;
        self.text_char_height = 1;
        self.char_offset = (0.0, 0.0);
        self.update_text_size();
    }

    fn initialize(&mut self) {
        self.clear_status();
        self.set_error(0);
        self.p1 = Point::new(DEF_X_P1, DEF_Y_P1);
        self.p2 = Point::new(DEF_X_P2, DEF_Y_P2);
        self.set_defaults();
        self.set_status_1(8);
        self.pen = Point::new(RST_X, RST_Y);
        self.last_pen = Point::new(RST_X, RST_Y);
        self.scaled_pen = Point::new(RST_X, RST_Y);
        self.set_pen_zone(PenZone::InWindow);
        self.last_pen_draw = NO_PEN;
        self.last_pen_down = NO_PEN;
        self.cmd_pen_down = false;
        // Force the pen status update
        self.pen_down = true;
        self.set_pen_down(false);
    }

    fn is_drawing(&self) -> bool {
        self.pen_down && self.pen_no != 0
    }

    fn set_pen_down(&mut self, state: bool) {
        if !self.pen_down && state {
            self.last_pen_down = self.last_pen;
        } else if self.is_drawing() && !state && self.last_pen == self.last_pen_down {
            // A point is drawn when the pen is raised exactly where it went
            // down, provided the previous segment ended somewhere else
            self.draw_point(self.last_pen);
        }
        self.pen_down = state;
    }

    fn set_pen_zone(&mut self, zone: PenZone) {
        self.pen_zone = zone;
        if zone == PenZone::Faraway {
            self.set_pen_down(false);
        }
        self.io.set_ol_led(zone as u8);
    }

    fn update_pen_zone(&mut self) {
        let zone = if self.window.contains(self.last_pen) {
            PenZone::InWindow
        } else {
            PenZone::Nearby
        };
        self.set_pen_zone(zone);
    }

    fn update_pen_zone_and_up(&mut self) {
        self.last_pen = self.pen;
        self.update_pen_zone();
        self.cmd_pen_up();
    }

    fn cmd_pen_up(&mut self) {
        self.cmd_pen_down = false;
        self.set_status_0(0x01);
        if self.pen_zone != PenZone::Faraway {
            self.set_pen_down(false);
        }
    }

    fn check_scaled_coord(coord: i64) -> Result<i32, CmdError> {
        if (MIN_INT_SC..=MAX_INT_SC).contains(&coord) {
            Ok(coord as i32)
        } else {
            Err(CmdError::PosOverflow)
        }
    }

    fn scale_coord(coord_m_min: i64, in_range: i64, out_range: i64) -> Result<i64, CmdError> {
        if in_range == 0 {
            return Err(CmdError::PosOverflow);
        }
        let x = (out_range as f64 * coord_m_min as f64) / in_range as f64;
        Ok(truncate_half_even(x) as i64)
    }

    /// Recompute the user-unit pen position from the plotter-unit one.
    fn inverse_scale_and_update(&mut self) {
        let scaling = match self.scaling {
            Some(s) => s,
            None => return,
        };
        let res = (|| -> Result<Point, CmdError> {
            let p2p1_diff_x = i64::from(self.p2.x - self.p1.x);
            let x = if p2p1_diff_x >= 0 {
                i64::from(scaling.pll.x)
                    + Self::scale_coord(
                        i64::from(self.last_pen.x - self.p1.x),
                        p2p1_diff_x,
                        i64::from(scaling.pur.x - scaling.pll.x),
                    )?
            } else {
                i64::from(scaling.pur.x)
                    + Self::scale_coord(
                        i64::from(self.last_pen.x - self.p2.x),
                        -p2p1_diff_x,
                        i64::from(scaling.pll.x - scaling.pur.x),
                    )?
            };
            let x = Self::check_scaled_coord(x)?;
            let p2p1_diff_y = i64::from(self.p2.y - self.p1.y);
            let y = if p2p1_diff_y >= 0 {
                i64::from(scaling.pll.y)
                    + Self::scale_coord(
                        i64::from(self.last_pen.y - self.p1.y),
                        p2p1_diff_y,
                        i64::from(scaling.pur.y - scaling.pll.y),
                    )?
            } else {
                i64::from(scaling.pur.y)
                    + Self::scale_coord(
                        i64::from(self.last_pen.y - self.p2.y),
                        -p2p1_diff_y,
                        i64::from(scaling.pll.y - scaling.pur.y),
                    )?
            };
            let y = Self::check_scaled_coord(y)?;
            Ok(Point::new(x, y))
        })();
        match res {
            Ok(p) => self.scaled_pen = p,
            Err(_) => self.set_pen_zone(PenZone::Faraway),
        }
    }

    fn segment_output(&mut self, s: Segment) {
        if !s.null_len() || s.p1 != self.last_pen_draw {
            self.io.draw_segment(s.p1, s.p2, self.pen_no);
            self.last_pen_draw = s.p2;
        }
    }

    fn draw_point(&mut self, p: Point) {
        self.segment_output(Segment::new(p, p));
    }

    fn draw_to_point(&mut self, dest: Point, pen_down: bool) {
        let s = Segment::new(self.last_pen, dest);
        if let Some(clipped) = self.window.clip_segment(&s) {
            if pen_down && self.pen_no != 0 {
                self.segment_output(clipped);
            }
            self.pen = clipped.p2;
            self.last_pen = dest;
            let zone = if clipped.p2 == dest {
                PenZone::InWindow
            } else {
                PenZone::Nearby
            };
            self.set_pen_zone(zone);
            self.set_pen_down(if zone == PenZone::InWindow {
                pen_down
            } else {
                false
            });
        } else {
            // Entirely outside the window: the pen does not move
            self.last_pen = dest;
            self.set_pen_zone(PenZone::Nearby);
        }
    }

    fn draw_to_point_sym(&mut self, dest: Point, pen_down: bool) {
        self.draw_to_point(dest, pen_down);
        if let Some(code) = self.text_symbol {
            if let Some(g) = font::glyph(code) {
                // Symbol mode: draw the glyph centered on the vertex
                self.pos_in_cell = (g.center.0 * 2, g.center.1 * 2);
                self.text_ref_point = self.last_pen;
                self.char_offset = (0.0, 0.0);
                self.draw_char(g);
                self.pos_in_cell = (0, 0);
                self.draw_to_point_char(false);
            }
        }
    }

    fn draw_pattern_line_sym(&mut self, dest: Point) {
        if self.line_type == LT_SOLID || !self.cmd_pen_down {
            self.draw_to_point_sym(dest, self.cmd_pen_down);
        } else if self.line_type == LT_2_POINTS {
            // A dot at each endpoint
            self.draw_to_point_sym(dest, false);
            if self.pen_zone == PenZone::InWindow && self.pen_no != 0 {
                self.draw_point(dest);
            }
        } else if dest == self.last_pen {
            self.draw_to_point_sym(dest, true);
        } else {
            let pat = LT_PATTERNS[(self.line_type - 1) as usize];
            loop {
                if self.line_pat_rem == 0 {
                    self.line_pat_idx += 1;
                    if self.line_pat_idx >= pat.len() as i32 {
                        self.line_pat_idx = 0;
                    }
                    let base = self.line_type_pct * self.p1.dist(&self.p2);
                    self.line_pat_rem =
                        (base * pat[self.line_pat_idx as usize] as f64 / 10000.0) as i64;
                }
                let rem = self.last_pen.dist(&dest) as i64;
                let draw = self.line_pat_idx & 1 == 0;
                if rem <= self.line_pat_rem {
                    self.line_pat_rem -= rem;
                    self.draw_to_point_sym(dest, draw);
                    break;
                } else {
                    let p = self.line_pat_rem as f64 / rem as f64;
                    let delta = dest - self.last_pen;
                    let pdest = Point::new(
                        self.last_pen.x + (p * f64::from(delta.x)) as i32,
                        self.last_pen.y + (p * f64::from(delta.y)) as i32,
                    );
                    self.draw_to_point(pdest, draw);
                    self.line_pat_rem = 0;
                }
            }
        }
    }

    // Text subsystem

    fn scale_to_p1p2(&self, pt: (f64, f64)) -> (f64, f64) {
        (
            pt.0 * f64::from((self.p1.x - self.p2.x).abs()),
            pt.1 * f64::from((self.p1.y - self.p2.y).abs()),
        )
    }

    fn update_text_size(&mut self) {
        let tmp = if self.text_size_rel {
            self.scale_to_p1p2(self.text_size)
        } else {
            self.text_size
        };
        let prev_width = self.text_char_width;
        self.text_char_width = (tmp.0 * 1.5) as i32;
        let prev_height = self.text_char_height;
        self.text_char_height = (tmp.1 * 2.0) as i32;
        self.char_offset.0 *= f64::from(prev_width);
        if self.text_char_width != 0 {
            self.char_offset.0 /= f64::from(self.text_char_width);
        }
        self.char_offset.1 *= f64::from(prev_height);
        if self.text_char_height != 0 {
            self.char_offset.1 /= f64::from(self.text_char_height);
        }
    }

    fn compute_text_dir(&mut self) {
        let tmp = if self.text_dir_rel {
            self.scale_to_p1p2(self.text_dir)
        } else {
            self.text_dir
        };
        let l = (tmp.0 * tmp.0 + tmp.1 * tmp.1).sqrt();
        if l < 1.0e-3 {
            self.text_direction = (0.0, 0.0);
        } else {
            self.text_direction = (tmp.0 / l, tmp.1 / l);
        }
    }

    fn start_text_drawing(&mut self) {
        if !self.text_drawing {
            self.text_drawing = true;
            self.text_ref_point = self.last_pen;
            self.char_offset = (0.0, 0.0);
        }
    }

    fn check_overflow(&mut self, coord: i64) -> i32 {
        if coord < -32768 {
            self.set_error(6);
            -32768
        } else if coord > 32767 {
            self.set_error(6);
            32767
        } else {
            coord as i32
        }
    }

    fn clamped_scaling(&mut self, coord: f64, scale: i32) -> i32 {
        self.check_overflow((coord * f64::from(scale)) as i64)
    }

    fn rotate_text_point(&mut self, x: i32, y: i32) -> i32 {
        let tmpx = self.check_overflow((f64::from(x) * self.text_direction.1) as i64);
        let tmpy = self.check_overflow((f64::from(y) * self.text_direction.0) as i64);
        self.check_overflow(i64::from(tmpx) + i64::from(tmpy))
    }

    fn draw_to_point_char(&mut self, pen_down: bool) {
        if self.pen_zone == PenZone::Faraway {
            return;
        }
        let cell_x = f64::from(self.pos_in_cell.0) / 96.0;
        let cell_y = f64::from(self.pos_in_cell.1) / 128.0;
        let fx = cell_x + self.char_offset.0;
        let mut tx = self.clamped_scaling(fx, self.text_char_width);
        let shear_base = self.clamped_scaling(cell_y, self.text_char_height);
        tx = self
            .check_overflow(i64::from(tx) + (self.text_slant * f64::from(shear_base)) as i64);
        let fy = cell_y + self.char_offset.1;
        let ty = self.clamped_scaling(fy, self.text_char_height);
        let rx = self.rotate_text_point(-ty, tx);
        let destx = self.check_overflow(i64::from(self.text_ref_point.x) + i64::from(rx));
        let ry = self.rotate_text_point(tx, ty);
        let desty = self.check_overflow(i64::from(self.text_ref_point.y) + i64::from(ry));
        self.draw_to_point(Point::new(destx, desty), pen_down);
    }

    fn draw_char(&mut self, g: &Glyph) {
        for &(pen, dx, dy) in g.moves {
            self.pos_in_cell.0 += 2 * dx;
            self.pos_in_cell.1 += 2 * dy;
            self.draw_to_point_char(pen);
        }
    }

    fn zero_char_offset_x(&mut self) {
        self.char_offset.0 = 0.0;
    }

    fn move_char_offset_x(&mut self, delta_x: f64) {
        self.char_offset.0 = (self.char_offset.0 + delta_x).max(-32768.0).min(32767.0);
    }

    fn move_char_offset_y(&mut self, delta_y: f64) {
        self.char_offset.1 = (self.char_offset.1 + delta_y).max(-32768.0).min(32767.0);
    }

    fn zero_pos_in_cell_and_draw(&mut self, pen_down: bool) {
        self.pos_in_cell = (0, 0);
        self.draw_to_point_char(pen_down);
    }

    fn move_char_offset_y_and_draw(&mut self, delta_y: f64) {
        self.move_char_offset_y(delta_y);
        self.zero_pos_in_cell_and_draw(false);
    }

    fn carriage_return(&mut self) {
        self.zero_char_offset_x();
        self.zero_pos_in_cell_and_draw(false);
    }

    fn move_to_next_char(&mut self) {
        self.move_char_offset_x(1.0);
        self.zero_pos_in_cell_and_draw(false);
    }

    // Status and error plumbing

    fn set_error(&mut self, err_no: u8) {
        if err_no == 0 {
            self.io.set_error_led(false);
            self.err_no = 0;
            self.set_status_0(0x20);
        } else if (1u8 << (err_no - 1)) & self.set_in_masks[0] != 0 && self.err_no == 0 {
            debug!("error {}", err_no);
            self.io.set_error_led(true);
            self.err_no = err_no;
            self.set_status_1(0x20);
        }
    }

    fn set_status_1(&mut self, mask: u8) {
        self.status |= mask;
        self.io.set_status_byte(self.status & 0x3f);
        let tmp = self.status & self.set_in_masks[2];
        if tmp != 0 {
            self.pp_accum |= tmp;
            self.io.set_pp_state(true);
        }
        let tmp = self.status & self.set_in_masks[1];
        if tmp != 0 {
            self.srq_accum |= tmp;
            self.io.set_rsv_state(true);
        }
    }

    fn set_status_0(&mut self, mask: u8) {
        let mask = !mask;
        self.status &= mask;
        self.io.set_status_byte(self.status & 0x3f);
        self.pp_accum &= mask;
        if self.pp_accum == 0 {
            self.io.set_pp_state(false);
        }
        self.srq_accum &= mask;
        if self.srq_accum == 0 {
            self.io.set_rsv_state(false);
        }
    }

    // Argument helpers

    fn count_ok(args: &[Arg], min: usize, max: Option<usize>) -> Result<(), CmdError> {
        if args.len() < min || max.map_or(false, |m| args.len() > m) {
            Err(CmdError::WrongNumArgs)
        } else {
            Ok(())
        }
    }

    fn int_args(args: &[Arg], min: usize, max: Option<usize>) -> Result<Vec<i64>, CmdError> {
        Self::count_ok(args, min, max)?;
        args.iter()
            .map(|a| match a {
                Arg::Int(v) => Ok(*v),
                _ => Err(CmdError::InvalidArg),
            })
            .collect()
    }

    fn fixed_args(args: &[Arg], min: usize, max: Option<usize>) -> Result<Vec<f64>, CmdError> {
        Self::count_ok(args, min, max)?;
        args.iter()
            .map(|a| match a {
                Arg::Fixed(v) => Ok(*v),
                Arg::Int(v) if v.abs() <= MAX_ABS_DEC => Ok(*v as f64),
                _ => Err(CmdError::InvalidArg),
            })
            .collect()
    }

    fn no_args(args: &[Arg]) -> Result<(), CmdError> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(CmdError::WrongNumArgs)
        }
    }

    // Commands

    fn select_charset(&mut self, args: &[Arg], which: usize) -> CmdResult {
        let args = Self::int_args(args, 0, Some(1))?;
        match args.first() {
            None => self.text_sets[which] = 0,
            Some(&v) if (0..=4).contains(&v) => self.text_sets[which] = v as u8,
            Some(_) => return Err(CmdError::UnknownCharSet),
        }
        Ok(None)
    }

    fn cmd_cp(&mut self, args: &[Arg]) -> CmdResult {
        self.start_text_drawing();
        let res = (|| -> CmdResult {
            let args = Self::fixed_args(args, 0, Some(2))?;
            if args.is_empty() {
                self.zero_char_offset_x();
                self.move_char_offset_y_and_draw(-1.0);
            } else if args.len() == 2 {
                if (MIN_DEC..=MAX_DEC).contains(&args[0])
                    && (MIN_DEC..=MAX_DEC).contains(&args[1])
                {
                    self.move_char_offset_x(args[0]);
                    self.move_char_offset_y(args[1]);
                    self.zero_pos_in_cell_and_draw(self.cmd_pen_down);
                } else {
                    return Err(CmdError::InvalidArg);
                }
            } else {
                return Err(CmdError::WrongNumArgs);
            }
            Ok(None)
        })();
        self.inverse_scale_and_update();
        res
    }

    fn cmd_df(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        self.set_defaults();
        Ok(None)
    }

    fn set_text_dir(&mut self, args: &[Arg], relative: bool) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(2))?;
        if args.is_empty() {
            self.text_dir = (1.0, 0.0);
        } else if args.len() == 2 {
            if (MIN_DEC..=MAX_DEC).contains(&args[0])
                && (MIN_DEC..=MAX_DEC).contains(&args[1])
                && (args[0] != 0.0 || args[1] != 0.0)
            {
                self.text_dir = (args[0], args[1]);
            } else {
                return Err(CmdError::InvalidArg);
            }
        } else {
            return Err(CmdError::WrongNumArgs);
        }
        self.text_dir_rel = relative;
        self.text_drawing = false;
        self.compute_text_dir();
        Ok(None)
    }

    fn cmd_im(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::int_args(args, 0, Some(3))?;
        if args.is_empty() {
            self.set_in_masks = [223, 0, 0];
        } else {
            for (i, &m) in args.iter().enumerate() {
                if !(0..=255).contains(&m) {
                    return Err(CmdError::InvalidArg);
                }
                self.set_in_masks[i] = m as u8;
            }
        }
        Ok(None)
    }

    fn cmd_in(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        self.initialize();
        Ok(None)
    }

    fn cmd_ip(&mut self, args: &[Arg]) -> CmdResult {
        if args.is_empty() {
            self.p1 = Point::new(DEF_X_P1, DEF_Y_P1);
            self.p2 = Point::new(DEF_X_P2, DEF_Y_P2);
        } else {
            let a = Self::int_args(args, 4, Some(4))?;
            let in_x = |v: i64| (i64::from(MIN_X_PHY)..=i64::from(MAX_X_PHY)).contains(&v);
            let in_y = |v: i64| (i64::from(MIN_Y_PHY)..=i64::from(MAX_Y_PHY)).contains(&v);
            if in_x(a[0]) && in_x(a[2]) && in_y(a[1]) && in_y(a[3]) {
                self.p1 = Point::new(a[0] as i32, a[1] as i32);
                self.p2 = Point::new(a[2] as i32, a[3] as i32);
            } else {
                return Err(CmdError::InvalidArg);
            }
        }
        self.set_status_1(0x02);
        self.update_text_size();
        self.compute_text_dir();
        if self.scaling.is_some() {
            self.update_pen_zone_and_up();
            self.inverse_scale_and_update();
        }
        Ok(None)
    }

    fn cmd_iw(&mut self, args: &[Arg]) -> CmdResult {
        if args.is_empty() {
            self.window = Rectangle::new(
                Point::new(MIN_X_PHY, MIN_Y_PHY),
                Point::new(MAX_X_PHY, MAX_Y_PHY),
            );
        } else {
            let a = Self::int_args(args, 4, Some(4))?;
            // Bounds are clamped to the physical area; the lower ones are
            // also aligned to even coordinates
            let xmin = a[0].max(0) & !1;
            let ymin = a[1].max(0) & !1;
            let xmax = a[2].min(i64::from(MAX_X_PHY));
            let ymax = a[3].min(i64::from(MAX_Y_PHY));
            if xmin > xmax || ymin > ymax {
                return Err(CmdError::InvalidArg);
            }
            self.window = Rectangle::new(
                Point::new(xmin as i32, ymin as i32),
                Point::new(xmax as i32, ymax as i32),
            );
        }
        self.update_pen_zone();
        if self.pen_zone == PenZone::Nearby {
            self.set_pen_down(false);
        }
        Ok(None)
    }

    fn cmd_lb(&mut self, args: &[Arg]) -> CmdResult {
        let s = match args.first() {
            Some(Arg::Str(s)) => s.clone(),
            _ => return Err(CmdError::WrongNumArgs),
        };
        if !s.is_empty() {
            self.start_text_drawing();
            for c in s.chars() {
                let code = c as u32;
                match code {
                    0x21..=0x10_ffff => {
                        let byte = if code <= 0xff { code as u8 } else { 0 };
                        match font::translate_code(self.text_sets[self.text_cur_set], byte) {
                            None => self.set_error(4),
                            Some(g_code) => {
                                if let Some(g) = font::glyph(g_code) {
                                    self.pos_in_cell = (0, 0);
                                    self.draw_char(g);
                                    if !g.backspace {
                                        self.move_char_offset_x(1.0);
                                    }
                                    self.set_pen_down(false);
                                }
                            }
                        }
                    }
                    0x20 => self.move_to_next_char(),
                    // DC1..DC4, FF, HT, BEL are ignored
                    0x11..=0x14 | 0x0c | 0x09 | 0x07 => {}
                    // SI/SO select the standard/alternate set
                    0x0f => self.text_cur_set = 0,
                    0x0e => self.text_cur_set = 1,
                    0x0d => self.carriage_return(),
                    // VT/LF move one line up/down
                    0x0b => self.move_char_offset_y_and_draw(1.0),
                    0x0a => self.move_char_offset_y_and_draw(-1.0),
                    0x08 => {
                        self.move_char_offset_x(-1.0);
                        self.zero_pos_in_cell_and_draw(false);
                    }
                    _ => self.set_error(4),
                }
            }
            self.zero_pos_in_cell_and_draw(false);
            self.set_pen_down(self.cmd_pen_down);
        }
        self.inverse_scale_and_update();
        Ok(None)
    }

    fn cmd_lt(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(2))?;
        if !args.is_empty() {
            if args[0] < 0.0 || args[0] >= 7.0 {
                return Err(CmdError::InvalidArg);
            }
            self.line_type = args[0] as i32;
            if args.len() == 2 {
                if args[1] <= 0.0 || args[1] > MAX_DEC {
                    return Err(CmdError::InvalidArg);
                }
                self.line_type_pct = args[1];
            }
            self.line_pat_idx = -1;
            self.line_pat_rem = 0;
        } else {
            self.line_type = LT_SOLID;
            self.set_pen_down(self.cmd_pen_down);
        }
        Ok(None)
    }

    fn cmd_oa(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        Ok(Some(format!(
            "{},{},{}\r\n",
            self.pen.x, self.pen.y, self.pen_down as u8
        )))
    }

    fn cmd_oc(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        let out = if self.scaling.is_none() {
            format!(
                "{},{},{}\r\n",
                self.last_pen.x, self.last_pen.y, self.cmd_pen_down as u8
            )
        } else if self.pen_zone == PenZone::Faraway {
            format!(
                "{},{},{}\r\n",
                MAX_INT_NO_SC, MAX_INT_NO_SC, self.cmd_pen_down as u8
            )
        } else {
            format!(
                "{},{},{}\r\n",
                self.scaled_pen.x, self.scaled_pen.y, self.cmd_pen_down as u8
            )
        };
        Ok(Some(out))
    }

    fn cmd_oe(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        let save = self.err_no;
        self.set_error(0);
        Ok(Some(format!("{}\r\n", save)))
    }

    fn cmd_op(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        let mut p2 = self.p2;
        if p2.x == self.p1.x {
            p2.x += 1;
        }
        if p2.y == self.p1.y {
            p2.y += 1;
        }
        self.set_status_0(2);
        Ok(Some(format!(
            "{},{},{},{}\r\n",
            self.p1.x, self.p1.y, p2.x, p2.y
        )))
    }

    fn cmd_os(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        let save = self.status;
        self.set_status_0(8);
        Ok(Some(format!("{}\r\n", save)))
    }

    fn plot(&mut self, args: &[Arg], absolute: bool) -> CmdResult {
        let points = Self::int_args(args, 0, None)?;
        let mut it = points.chunks(2);
        for pair in &mut it {
            self.text_drawing = false;
            if pair.len() != 2 {
                // Odd number of parameters
                return Err(CmdError::WrongNumArgs);
            }
            let (px, py) = (pair[0], pair[1]);
            let mut dest = None;
            if px.abs() <= MAX_INT_NO_SC && py.abs() <= MAX_INT_NO_SC {
                match self.scaling {
                    None => {
                        if absolute {
                            dest = Some(Point::new(px as i32, py as i32));
                        } else {
                            let nx = px + i64::from(self.last_pen.x);
                            let ny = py + i64::from(self.last_pen.y);
                            if nx.abs() <= MAX_INT_NO_SC && ny.abs() <= MAX_INT_NO_SC {
                                dest = Some(Point::new(nx as i32, ny as i32));
                            }
                        }
                    }
                    Some(scaling) => {
                        dest = self.scale_user_point(scaling, px, py, absolute).ok();
                    }
                }
            }
            match dest {
                Some(d) => {
                    if self.pen_zone != PenZone::Faraway {
                        self.draw_pattern_line_sym(d);
                    } else {
                        self.draw_to_point(d, false);
                    }
                }
                None => self.set_pen_zone(PenZone::Faraway),
            }
        }
        Ok(None)
    }

    fn scale_user_point(
        &mut self,
        scaling: Rectangle,
        mut px: i64,
        mut py: i64,
        absolute: bool,
    ) -> Result<Point, CmdError> {
        Self::check_scaled_coord(px)?;
        Self::check_scaled_coord(py)?;
        if !absolute {
            px += i64::from(self.scaled_pen.x);
            Self::check_scaled_coord(px)?;
            py += i64::from(self.scaled_pen.y);
            Self::check_scaled_coord(py)?;
        }
        let max_m_min_x = i64::from(scaling.pur.x - scaling.pll.x);
        let p2p1_diff_x = i64::from(self.p2.x - self.p1.x);
        let x = if p2p1_diff_x >= 0 {
            i64::from(self.p1.x)
                + Self::scale_coord(px - i64::from(scaling.pll.x), max_m_min_x, p2p1_diff_x)?
        } else {
            i64::from(self.p2.x)
                + Self::scale_coord(px - i64::from(scaling.pur.x), max_m_min_x, p2p1_diff_x)?
        };
        let x = Self::check_scaled_coord(x)?;
        let max_m_min_y = i64::from(scaling.pur.y - scaling.pll.y);
        let p2p1_diff_y = i64::from(self.p2.y - self.p1.y);
        let y = if p2p1_diff_y >= 0 {
            i64::from(self.p1.y)
                + Self::scale_coord(py - i64::from(scaling.pll.y), max_m_min_y, p2p1_diff_y)?
        } else {
            i64::from(self.p2.y)
                + Self::scale_coord(py - i64::from(scaling.pur.y), max_m_min_y, p2p1_diff_y)?
        };
        let y = Self::check_scaled_coord(y)?;
        self.scaled_pen = Point::new(px as i32, py as i32);
        Ok(Point::new(x, y))
    }

    fn cmd_pd(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        if !self.cmd_pen_down {
            self.cmd_pen_down = true;
            self.set_status_1(0x01);
            if self.pen_zone == PenZone::InWindow {
                self.set_pen_down(true);
            }
        }
        Ok(None)
    }

    fn cmd_pu(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        if self.cmd_pen_down {
            self.cmd_pen_up();
        }
        Ok(None)
    }

    fn cmd_sc(&mut self, args: &[Arg]) -> CmdResult {
        if args.is_empty() {
            if self.scaling.is_some() {
                self.scaling = None;
                self.update_pen_zone_and_up();
            }
        } else {
            let a = Self::int_args(args, 4, Some(4))?;
            let (xmin, xmax, ymin, ymax) = (a[0], a[1], a[2], a[3]);
            let in_range = |v: i64| (MIN_INT_SC..=MAX_INT_SC).contains(&v);
            if in_range(xmin) && in_range(xmax) && in_range(ymin) && in_range(ymax)
                && xmin < xmax
                && ymin < ymax
            {
                self.scaling = Some(Rectangle::new(
                    Point::new(xmin as i32, ymin as i32),
                    Point::new(xmax as i32, ymax as i32),
                ));
                self.update_pen_zone_and_up();
                self.inverse_scale_and_update();
            } else {
                return Err(CmdError::InvalidArg);
            }
        }
        Ok(None)
    }

    fn cmd_si(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(2))?;
        if args.is_empty() {
            self.text_size_rel = false;
            self.text_size = (114.0, 150.0);
            self.update_text_size();
        } else if args.len() == 2 {
            let lim = 10485.0 / 256.0;
            if args[0] > 0.0 && args[0] < lim && args[1] > 0.0 && args[1] < lim {
                self.text_size_rel = false;
                self.text_size = ((args[0] * 400.0).trunc(), (args[1] * 400.0).trunc());
                self.update_text_size();
            } else {
                return Err(CmdError::InvalidArg);
            }
        } else {
            return Err(CmdError::WrongNumArgs);
        }
        Ok(None)
    }

    fn cmd_sl(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(1))?;
        match args.first() {
            None => self.text_slant = 0.0,
            Some(&v) if (MIN_DEC..=MAX_DEC).contains(&v) => self.text_slant = v,
            Some(_) => return Err(CmdError::InvalidArg),
        }
        Ok(None)
    }

    fn cmd_sm(&mut self, args: &[Arg]) -> CmdResult {
        self.text_symbol = None;
        match args.first() {
            None => Ok(None),
            Some(Arg::Str(s)) => {
                let byte = s.bytes().next().unwrap_or(0);
                match font::translate_code(self.text_sets[self.text_cur_set], byte) {
                    Some(code) => {
                        self.text_symbol = Some(code);
                        Ok(None)
                    }
                    None => Err(CmdError::InvalidArg),
                }
            }
            Some(_) => Err(CmdError::WrongNumArgs),
        }
    }

    fn cmd_sp(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::int_args(args, 0, Some(1))?;
        match args.first() {
            None => self.pen_no = 0,
            Some(&v) if (0..=8).contains(&v) => self.pen_no = v as u8,
            Some(_) => {}
        }
        Ok(None)
    }

    fn cmd_sr(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(2))?;
        if args.is_empty() {
            self.text_size_rel = true;
            self.text_size = (0.0075, 0.015);
            self.update_text_size();
        } else if args.len() == 2 {
            if args[0] > 0.0 && args[0] <= MAX_DEC && args[1] > 0.0 && args[1] <= MAX_DEC {
                self.text_size_rel = true;
                self.text_size = (args[0] / 100.0, args[1] / 100.0);
                self.update_text_size();
            } else {
                return Err(CmdError::InvalidArg);
            }
        } else {
            return Err(CmdError::WrongNumArgs);
        }
        Ok(None)
    }

    fn cmd_tl(&mut self, args: &[Arg]) -> CmdResult {
        let args = Self::fixed_args(args, 0, Some(2))?;
        if args.is_empty() {
            self.neg_tick = 0.005;
            self.pos_tick = 0.005;
        } else if args.len() == 1 && (0.0..=MAX_DEC).contains(&args[0]) {
            self.pos_tick = args[0] / 100.0;
            self.neg_tick = 0.0;
        } else if args.len() == 2
            && (0.0..=MAX_DEC).contains(&args[0])
            && (0.0..=MAX_DEC).contains(&args[1])
        {
            self.pos_tick = args[0] / 100.0;
            self.neg_tick = args[1] / 100.0;
        } else {
            return Err(CmdError::InvalidArg);
        }
        Ok(None)
    }

    fn cmd_uc(&mut self, args: &[Arg]) -> CmdResult {
        self.start_text_drawing();
        let res = (|| -> CmdResult {
            let points = Self::int_args(args, 0, None)?;
            if points.is_empty() {
                self.carriage_return();
            } else {
                self.zero_pos_in_cell_and_draw(false);
                let mut pen = false;
                let mut it = points.iter();
                while let Some(&pt) = it.next() {
                    if pt >= 99 {
                        pen = true;
                    } else if pt <= -99 {
                        pen = false;
                    } else {
                        let next = match it.next() {
                            Some(&v) => v,
                            None => return Err(CmdError::WrongNumArgs),
                        };
                        if next.abs() > 98 {
                            return Err(CmdError::InvalidArg);
                        }
                        self.pos_in_cell.0 += pt as i32 * 16;
                        self.pos_in_cell.1 += next as i32 * 8;
                        self.draw_to_point_char(pen);
                    }
                }
                self.move_to_next_char();
            }
            Ok(None)
        })();
        self.inverse_scale_and_update();
        res
    }

    fn draw_tick(&mut self, off: Point) {
        let save = self.last_pen;
        self.draw_to_point(save + off, true);
        self.draw_to_point(save, true);
    }

    fn cmd_xt(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        if self.pen_zone != PenZone::Faraway {
            let span = f64::from((self.p2.y - self.p1.y).abs());
            self.draw_tick(Point::new(0, (self.pos_tick * span) as i32));
            self.draw_tick(Point::new(0, (-self.neg_tick * span) as i32));
        }
        Ok(None)
    }

    fn cmd_yt(&mut self, args: &[Arg]) -> CmdResult {
        Self::no_args(args)?;
        if self.pen_zone != PenZone::Faraway {
            let span = f64::from((self.p2.x - self.p1.x).abs());
            self.draw_tick(Point::new((self.pos_tick * span) as i32, 0));
            self.draw_tick(Point::new((-self.neg_tick * span) as i32, 0));
        }
        Ok(None)
    }

    fn exec_command(&mut self, cmd: &Command) {
        let args = &cmd.args;
        let res = match cmd.cmd.as_str() {
            "CA" => self.select_charset(args, 1),
            "CP" => self.cmd_cp(args),
            "CS" => self.select_charset(args, 0),
            "DF" => self.cmd_df(args),
            "DI" => self.set_text_dir(args, false),
            "DR" => self.set_text_dir(args, true),
            "IM" => self.cmd_im(args),
            "IN" => self.cmd_in(args),
            "IP" => self.cmd_ip(args),
            "IW" => self.cmd_iw(args),
            "LB" => self.cmd_lb(args),
            "LT" => self.cmd_lt(args),
            "OA" => self.cmd_oa(args),
            "OC" => self.cmd_oc(args),
            "OE" => self.cmd_oe(args),
            "OF" => Self::no_args(args).map(|_| Some("40,40\r\n".to_string())),
            "OI" => Self::no_args(args).map(|_| Some("9872C\r\n".to_string())),
            "OO" => Self::no_args(args).map(|_| Some("2,1,0,0,0,0,0,0\r\n".to_string())),
            "OP" => self.cmd_op(args),
            "OS" => self.cmd_os(args),
            "PA" => self.plot(args, true),
            "PD" => self.cmd_pd(args),
            "PR" => {
                if self.pen_zone == PenZone::Faraway {
                    Ok(None)
                } else {
                    self.plot(args, false)
                }
            }
            "PU" => self.cmd_pu(args),
            "SA" => {
                Self::no_args(args).map(|_| {
                    self.text_cur_set = 1;
                    None
                })
            }
            "SC" => self.cmd_sc(args),
            "SI" => self.cmd_si(args),
            "SL" => self.cmd_sl(args),
            "SM" => self.cmd_sm(args),
            "SP" => self.cmd_sp(args),
            "SR" => self.cmd_sr(args),
            "SS" => {
                Self::no_args(args).map(|_| {
                    self.text_cur_set = 0;
                    None
                })
            }
            "TL" => self.cmd_tl(args),
            "UC" => self.cmd_uc(args),
            "XT" => self.cmd_xt(args),
            "YT" => self.cmd_yt(args),
            _ => {
                // Unknown command
                self.set_error(1);
                return;
            }
        };
        match res {
            Ok(Some(out)) => self.output = Some(out.into_bytes()),
            Ok(None) => {}
            Err(e) => self.set_error(e.number()),
        }
    }

    /// Run a block of HPGL text through the parser and the command
    /// dispatcher.
    pub fn exec_hpgl(&mut self, text: &str) {
        let mut parser = std::mem::take(&mut self.parser);
        for cmd in parser.push(text) {
            trace!("cmd {} {:?}", cmd.cmd, cmd.args);
            self.exec_command(&cmd);
        }
        self.parser = parser;
    }

    pub fn process_event(&mut self, ev: Event) {
        match ev {
            Event::Data { data, .. } => {
                // EOI is ignored; bit 7 is masked off every byte
                let text: String = data.iter().map(|&b| (b & 0x7f) as char).collect();
                self.exec_hpgl(&text);
            }
            Event::Talk { .. } => {
                if let Some(out) = self.output.take() {
                    self.io.talk_data(&out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPlotterPort {
        segments: Vec<(Point, Point, u8)>,
        status_bytes: Vec<u8>,
        talked: Vec<Vec<u8>>,
        error_led: bool,
        ol_led: u8,
    }

    impl PlotterPort for RecordingPlotterPort {
        fn draw_segment(&mut self, p1: Point, p2: Point, pen: u8) {
            self.segments.push((p1, p2, pen));
        }
        fn set_ol_led(&mut self, zone: u8) {
            self.ol_led = zone;
        }
        fn set_error_led(&mut self, on: bool) {
            self.error_led = on;
        }
        fn set_status_byte(&mut self, b: u8) {
            self.status_bytes.push(b);
        }
        fn set_pp_state(&mut self, _on: bool) {}
        fn set_rsv_state(&mut self, _on: bool) {}
        fn talk_data(&mut self, data: &[u8]) {
            self.talked.push(data.to_vec());
        }
    }

    fn new_plotter() -> Plotter<RecordingPlotterPort> {
        Plotter::new(RecordingPlotterPort::default())
    }

    fn output_of(plotter: &mut Plotter<RecordingPlotterPort>, cmds: &str) -> String {
        plotter.exec_hpgl(cmds);
        String::from_utf8(plotter.output.take().unwrap()).unwrap()
    }

    #[test]
    fn test_basic_draw() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP1;PA 1000,1000;PD;PA 2000,2000;");
        assert_eq!(
            p.io.segments,
            vec![(Point::new(1000, 1000), Point::new(2000, 2000), 1)]
        );
    }

    #[test]
    fn test_window_clipping() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP1;IW 0,0,1000,1000;PA -500,500;PD;PA 1500,500;");
        assert_eq!(
            p.io.segments,
            vec![(Point::new(0, 500), Point::new(1000, 500), 1)]
        );
    }

    #[test]
    fn test_pen_zero_draws_nothing() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP0;PA 100,100;PD;PA 200,200;");
        assert!(p.io.segments.is_empty());
    }

    #[test]
    fn test_scaling_maps_user_units() {
        let mut p = new_plotter();
        // One user unit square over the whole P1/P2 frame
        p.exec_hpgl("IN;SP1;SC 0,100,0,100;PA 0,0;PD;PA 100,0;");
        assert_eq!(
            p.io.segments,
            vec![(
                Point::new(DEF_X_P1, DEF_Y_P1),
                Point::new(DEF_X_P2, DEF_Y_P1),
                1
            )]
        );
    }

    #[test]
    fn test_unknown_command_sets_error_1() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;QQ;OE;");
        assert_eq!(out, "1\r\n");
        // OE clears the error
        let out = output_of(&mut p, "OE;");
        assert_eq!(out, "0\r\n");
    }

    #[test]
    fn test_wrong_args_error_2() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;PU 1;OE;");
        assert_eq!(out, "2\r\n");
    }

    #[test]
    fn test_invalid_arg_error_3() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;LT 9;OE;");
        assert_eq!(out, "3\r\n");
    }

    #[test]
    fn test_error_mask_gates_reporting() {
        let mut p = new_plotter();
        // Mask out error 1 (bit 0)
        let out = output_of(&mut p, "IN;IM 222;QQ;OE;");
        assert_eq!(out, "0\r\n");
    }

    #[test]
    fn test_output_identity_and_factors() {
        let mut p = new_plotter();
        assert_eq!(output_of(&mut p, "OI;"), "9872C\r\n");
        assert_eq!(output_of(&mut p, "OF;"), "40,40\r\n");
        assert_eq!(output_of(&mut p, "OO;"), "2,1,0,0,0,0,0,0\r\n");
    }

    #[test]
    fn test_op_reports_points() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;OP;");
        assert_eq!(out, "520,380,15720,10380\r\n");
        let out = output_of(&mut p, "IP 0,0,1000,1000;OP;");
        assert_eq!(out, "0,0,1000,1000\r\n");
    }

    #[test]
    fn test_oa_initial_position() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;OA;");
        assert_eq!(out, "16000,0,0\r\n");
    }

    #[test]
    fn test_oc_in_scaled_mode() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SC 0,100,0,100;PA 40,60;");
        let out = output_of(&mut p, "OC;");
        assert_eq!(out, "40,60,0\r\n");
    }

    #[test]
    fn test_status_bits() {
        let mut p = new_plotter();
        // After IN: ready for data (0x08 | 0x10)
        let out = output_of(&mut p, "IN;OS;");
        assert_eq!(out, "24\r\n");
        // Pen down adds bit 0; OS consumed bit 3
        let out = output_of(&mut p, "PD;OS;");
        assert_eq!(out, "17\r\n");
    }

    #[test]
    fn test_pen_up_point() {
        let mut p = new_plotter();
        // Pen down and up without moving: a single dot, but only once
        p.exec_hpgl("IN;SP1;PA 500,500;PD;PU;PD;PU;");
        assert_eq!(
            p.io.segments,
            vec![(Point::new(500, 500), Point::new(500, 500), 1)]
        );
    }

    #[test]
    fn test_lt_zero_dots_endpoints() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP1;LT 0;PA 100,100;PD;PA 300,100;");
        // Dots at the destination, no connecting line
        assert_eq!(
            p.io.segments,
            vec![(Point::new(300, 100), Point::new(300, 100), 1)]
        );
    }

    #[test]
    fn test_dashed_line_produces_multiple_segments() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP1;LT 2,10;PA 0,0;PD;PA 6000,0;");
        // Pattern 2 alternates 50/50; expect at least two drawn runs with
        // gaps between them
        let drawn: Vec<_> = p.io.segments.iter().filter(|s| s.0 != s.1).collect();
        assert!(drawn.len() >= 2, "segments: {:?}", p.io.segments);
        for (p1, p2, _) in &p.io.segments {
            assert_eq!(p1.y, 0);
            assert_eq!(p2.y, 0);
        }
    }

    #[test]
    fn test_label_draws_strokes() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SP1;PA 2000,2000;PD;LBA\x03");
        assert!(!p.io.segments.is_empty());
    }

    #[test]
    fn test_label_invalid_char_error_4() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;LB\u{1}\x03OE;");
        assert_eq!(out, "4\r\n");
    }

    #[test]
    fn test_unknown_charset_error_5() {
        let mut p = new_plotter();
        let out = output_of(&mut p, "IN;CS 7;OE;");
        assert_eq!(out, "5\r\n");
    }

    #[test]
    fn test_faraway_zone_on_big_plot() {
        let mut p = new_plotter();
        p.exec_hpgl("IN;SC 0,10,0,10;PA 16000,0;");
        assert_eq!(p.io.ol_led, 2);
        let out = output_of(&mut p, "OC;");
        assert_eq!(out, "32767,32767,0\r\n");
    }

    #[test]
    fn test_talk_returns_output_once() {
        let mut p = new_plotter();
        p.process_event(Event::Data {
            sec_addr: None,
            data: b"OI;".to_vec(),
            end: true,
            unlistened: false,
        });
        p.process_event(Event::Talk { sec_addr: None });
        assert_eq!(p.io.talked, vec![b"9872C\r\n".to_vec()]);
        p.process_event(Event::Talk { sec_addr: None });
        assert_eq!(p.io.talked.len(), 1);
    }
}
