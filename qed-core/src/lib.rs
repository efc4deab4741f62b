mod goal;
mod position;
mod status;

pub use self::goal::{Goal, Goals, ProofView};
pub use self::position::{
    position_at_relative, to_range_delta, Col, Line, Point, Range, RangeDelta, TextChange,
};
pub use self::status::Status;
