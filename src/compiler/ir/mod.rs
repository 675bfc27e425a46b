//! # Intermediate Languages
//!
//! One module per rung of the ladder, plus the types they share.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # Name, Label, DataType, ValueType, RecordType, operators, relations
//! ├── register.rs     # CHERI-RISC-V register file
//! ├── source.rs       # Sources and predicates over abstract locations
//! ├── physical.rs     # Physical locations and operations shared by CD, PR and BB
//! ├── instruction.rs  # CHERI-RISC-V instructions and their assembly
//! ├── ex.rs           # EX  nested expressions
//! ├── df.rs           # DF  definitions
//! ├── sv.rs           # SV  structured values
//! ├── cc.rs           # CC  calling convention
//! ├── cd.rs           # CD  conditionals
//! ├── pr.rs           # PR  predicates
//! ├── bb.rs           # BB  basic blocks
//! ├── rv.rs           # RV  instruction lists
//! └── s.rs            # S   assembly text
//! ```
//!
//! ## Lowering Steps
//!
//! | From | To | Step |
//! |------|----|------|
//! | EX | DF | Name nested values |
//! | DF | SV | Sequence definitions |
//! | SV | CC | Allocate buffers, compute field and element offsets |
//! | CC | CD | Apply the calling convention, home abstract locations |
//! | CD | PR | Split conditionals and calls into blocks |
//! | PR | BB | Reduce predicates to primitive branches |
//! | BB | RV | Linearise blocks, select instructions |
//! | RV | S | Render assembly, add the runtime |

pub mod bb;
pub mod cc;
pub mod cd;
pub mod df;
pub mod ex;
pub mod instruction;
pub mod physical;
pub mod pr;
pub mod register;
pub mod rv;
pub mod s;
pub mod source;
pub mod sv;
pub mod types;

pub use instruction::Instruction;
pub use register::Register;
pub use source::{Predicate, Source};
pub use types::{
    BinaryOperator, BranchRelation, CapabilityType, DataType, Field, Label, Name, Parameter,
    RecordType, ValueType,
};
