mod tables;

pub use self::tables::{plan as print_plan, solution as print_solution};
