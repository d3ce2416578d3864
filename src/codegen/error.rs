//! Error and diagnostic types for the emitter.
//!
//! Fatal problems abort emission through [`CompileError`]; recoverable ones
//! (an unsupported constant expression, an instruction we cannot lower, a
//! call with no known target) become [`CompilerWarning`]s that are printed
//! as they occur and collected alongside the output, while emission keeps
//! going. There is no partial-output guarantee on a fatal error: callers
//! should discard the stream.

use colour::{e_red_ln, e_yellow_ln};

#[derive(Debug, Clone)]
pub struct CompileError {
    pub msg: String,
    pub error_type: ErrorType,
    /// The function being lowered when the error was raised, if any.
    pub function: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// A source type with no target value kind.
    UnsupportedType,
    /// An intrinsic the lowerer does not recognize.
    UnknownIntrinsic,
    /// A broken renderer invariant, e.g. a break with no enclosing loop.
    RendererInvariant,
    /// Any other internal inconsistency (a compiler bug, not bad input).
    Internal,
}

impl CompileError {
    pub fn new(msg: impl Into<String>, error_type: ErrorType) -> CompileError {
        CompileError {
            msg: msg.into(),
            error_type,
            function: None,
        }
    }

    pub fn with_function(mut self, name: &str) -> CompileError {
        self.function = Some(name.to_owned());
        self
    }
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::UnsupportedType => "Unsupported Type",
        ErrorType::UnknownIntrinsic => "Unknown Intrinsic",
        ErrorType::RendererInvariant => "Renderer Invariant",
        ErrorType::Internal => "Internal Error",
    }
}

pub fn print_formatted_error(e: &CompileError) {
    e_red_ln!("ERROR: {}", error_type_to_str(&e.error_type));
    match &e.function {
        Some(f) => eprintln!("{} (in function '{}')", e.msg, f),
        None => eprintln!("{}", e.msg),
    }
}

/// Returns a new CompileError of the given type.
///
/// Usage: `return_codegen_error!(UnsupportedType, "unsupported type {:?}", ty);`
#[macro_export]
macro_rules! return_codegen_error {
    ($err_type:ident, $($arg:tt)*) => {
        return Err($crate::codegen::error::CompileError::new(
            format!($($arg)*),
            $crate::codegen::error::ErrorType::$err_type,
        ))
    };
}

#[derive(Debug, Clone)]
pub struct CompilerWarning {
    pub msg: String,
    pub warning_kind: WarningKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnsupportedConstantExpr,
    UnsupportedInstruction,
    UnknownCall,
    UnknownIndirectCall,
}

impl CompilerWarning {
    pub fn new(msg: impl Into<String>, warning_kind: WarningKind) -> CompilerWarning {
        CompilerWarning {
            msg: msg.into(),
            warning_kind,
        }
    }
}

pub fn print_formatted_warning(w: &CompilerWarning) {
    match w.warning_kind {
        WarningKind::UnsupportedConstantExpr => {
            e_yellow_ln!("warning: unsupported constant expr {}", w.msg);
        }
        WarningKind::UnsupportedInstruction => {
            e_yellow_ln!("warning: cannot lower instruction {}", w.msg);
        }
        WarningKind::UnknownCall => {
            e_yellow_ln!("warning: call to unknown function {}", w.msg);
        }
        WarningKind::UnknownIndirectCall => {
            e_yellow_ln!("warning: indirect call with no matching function table {}", w.msg);
        }
    }
}
