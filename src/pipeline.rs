//! Drives one function through every pass, from its CFG to allocated linear
//! code.

use crate::{
    backend::{
        linearize::linearize,
        regalloc::{AllInMemoryAllocator, Allocator, GraphColoringAllocator},
    },
    error::CodegenError,
    middle::{
        cfg::Cfg,
        lir::{FunctionData, LinearCode, Register, Statement, parse::parse_module},
        ssa::{enter_ssa, exit_ssa},
    },
    options::{AllocatorKind, CodegenOptions},
};

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub code: LinearCode,
    /// The context the code was generated in, with the final allocation
    pub function: FunctionData,
}

pub fn compile_function(
    mut cfg: Cfg,
    mut function: FunctionData,
    options: &CodegenOptions,
) -> Result<CompiledFunction, CodegenError> {
    let mut allocator: Option<Box<dyn Allocator>> = match options.allocator {
        AllocatorKind::None => None,
        AllocatorKind::AllInMemory => Some(Box::new(AllInMemoryAllocator)),
        AllocatorKind::GraphColoring => {
            if !(1..=Register::ALLOCATABLE.len()).contains(&options.registers) {
                return Err(CodegenError::RegisterBudget {
                    requested: options.registers,
                    available: Register::ALLOCATABLE.len(),
                });
            }
            Some(Box::new(GraphColoringAllocator::new(options.registers)))
        }
    };

    log::debug!("compiling {}", function.symbol_name);

    cfg.remove_unreachable();
    if options.ssa {
        enter_ssa(&mut cfg, &mut function);
    }

    if let Some(allocator) = allocator.as_mut() {
        allocator.prepare(&cfg, &mut function);
    }

    exit_ssa(&mut cfg, &mut function);

    let mut code = linearize(&cfg, &function, options);

    if let Some(allocator) = &allocator {
        code.statements = code
            .statements
            .into_iter()
            .flat_map(|statement| match statement {
                Statement::Label(_) => vec![statement],
                Statement::Instruction(instruction) => allocator
                    .replace(&instruction, &function)
                    .into_iter()
                    .map(Statement::Instruction)
                    .collect(),
            })
            .collect();
    }

    Ok(CompiledFunction { code, function })
}

/// Parses every function of `source` and compiles them one after the other
pub fn compile_module(
    source: &str,
    options: &CodegenOptions,
) -> Result<Vec<CompiledFunction>, CodegenError> {
    parse_module(source)?
        .into_iter()
        .map(|(cfg, function)| compile_function(cfg, function, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::lir::{Instruction, Operand};

    const SOURCE: &str = indoc! {"
        fn max(%a, %b) {
        entry:
            br gt %a, %b, first, second
        first:
            %m = mv %a
            jmp done
        second:
            %m = mv %b
            jmp done
        done:
            ret %m
        }
    "};

    #[test]
    fn allocated_code_mentions_no_temporary() {
        for allocator in [AllocatorKind::AllInMemory, AllocatorKind::GraphColoring] {
            let options = CodegenOptions {
                allocator,
                ..Default::default()
            };
            let compiled = compile_module(SOURCE, &options).unwrap();

            for instruction in compiled[0].code.instructions() {
                assert!(instruction.temporaries().is_empty(), "{instruction:?}");
            }
        }
    }

    #[test]
    fn without_allocation_temporaries_remain() {
        let options = CodegenOptions {
            allocator: AllocatorKind::None,
            ..Default::default()
        };
        let compiled = compile_module(SOURCE, &options).unwrap();

        assert!(!compiled[0].function.is_allocated());
        assert!(compiled[0].code.instructions().any(|i| matches!(
            i,
            Instruction::Move {
                source: Operand::Temporary(_),
                ..
            }
        )));
    }

    #[test]
    fn register_budget_is_checked() {
        let options = CodegenOptions {
            registers: 16,
            ..Default::default()
        };

        assert!(matches!(
            compile_module(SOURCE, &options),
            Err(CodegenError::RegisterBudget { requested: 16, .. })
        ));
    }

    #[test]
    fn unsupported_constructs_are_reported() {
        let result = compile_module(
            indoc! {"
                fn f() {
                entry:
                    %x = li 2.5
                    ret %x
                }
            "},
            &CodegenOptions::default(),
        );

        assert!(matches!(result, Err(CodegenError::Unsupported { .. })));
    }
}
