use indoc::indoc;
use ssac::{
    middle::lir::{
        DataLocation, Instruction, Register, Statement,
        interpret::{run_cfg, run_linear},
        parse::parse_function,
    },
    options::{AllocatorKind, BlockOrder, CodegenOptions},
    pipeline::compile_function,
};

/// Programs with the arguments to run them on
const PROGRAMS: &[(&str, &[&[i64]])] = &[
    (
        indoc! {"
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
        "},
        &[&[1, 2], &[5, -3], &[4, 4]],
    ),
    (
        indoc! {"
            fn factorial(%n) {
            entry:
                %acc = li 1
                jmp header
            header:
                br gt %n, 1, body, exit
            body:
                %acc = mul %acc, %n
                %n = sub %n, 1
                jmp header
            exit:
                ret %acc
            }
        "},
        &[&[0], &[1], &[6]],
    ),
    (
        indoc! {"
            fn fib(%n) {
            entry:
                %a = li 0
                %b = li 1
                jmp header
            header:
                br gt %n, 0, body, exit
            body:
                %t = add %a, %b
                %a = mv %b
                %b = mv %t
                %n = sub %n, 1
                jmp header
            exit:
                ret %a
            }
        "},
        &[&[0], &[1], &[12]],
    ),
    (
        // Euclid, with the loop test at the bottom
        indoc! {"
            fn gcd(%a, %b) {
            entry:
                br eq %b, 0, done, loop
            loop:
                %r = rem %a, %b
                %a = mv %b
                %b = mv %r
                br ne %b, 0, loop, done
            done:
                ret %a
            }
        "},
        &[&[12, 18], &[17, 5], &[9, 0]],
    ),
    (
        // More values live at once than there are registers in small budgets
        indoc! {"
            fn pressure(%x) {
            entry:
                %a = add %x, 1
                %b = add %x, 2
                %c = add %x, 3
                %d = add %x, 4
                %e = add %x, 5
                %f = mul %a, %b
                %g = mul %c, %d
                %h = add %f, %g
                %h = add %h, %e
                %h = sub %h, %a
                %h = sub %h, %b
                %h = add %h, %c
                %h = add %h, %d
                ret %h
            }
        "},
        &[&[0], &[3], &[-7]],
    ),
    (
        // Nested loops with a value defined only inside the inner one
        indoc! {"
            fn triangle(%n) {
            entry:
                %total = li 0
                %i = li 0
                jmp outer
            outer:
                br lt %i, %n, inner_init, exit
            inner_init:
                %j = li 0
                jmp inner
            inner:
                br le %j, %i, inner_body, outer_next
            inner_body:
                %step = li 1
                %total = add %total, %step
                %j = add %j, 1
                jmp inner
            outer_next:
                %i = add %i, 1
                jmp outer
            exit:
                ret %total
            }
        "},
        &[&[0], &[1], &[5]],
    ),
    (
        indoc! {"
            fn sign(%x) {
            entry:
                br lt %x, 0, negative, nonnegative
            negative:
                ret -1
            nonnegative:
                br eq %x, 0, zero, positive
            zero:
                ret 0
            positive:
                ret 1
            unused:
                %y = li 3
                ret %y
            }
        "},
        &[&[-4], &[0], &[9]],
    ),
];

fn all_options() -> Vec<CodegenOptions> {
    let mut all = Vec::new();
    for allocator in [
        AllocatorKind::None,
        AllocatorKind::AllInMemory,
        AllocatorKind::GraphColoring,
    ] {
        for ssa in [true, false] {
            for block_order in [BlockOrder::Declaration, BlockOrder::Trace] {
                for registers in [2, 3, 15] {
                    if registers != 15 && allocator != AllocatorKind::GraphColoring {
                        continue;
                    }
                    all.push(CodegenOptions {
                        allocator,
                        registers,
                        ssa,
                        block_order,
                        elide_jumps: block_order == BlockOrder::Trace,
                    });
                }
            }
        }
    }
    all
}

#[test]
fn compiled_code_behaves_like_the_source() {
    for (source, inputs) in PROGRAMS {
        let (cfg, function) = parse_function(source).unwrap();

        for options in all_options() {
            let compiled = compile_function(cfg.clone(), function.clone(), &options).unwrap();

            for arguments in *inputs {
                let expected = run_cfg(&cfg, &function, arguments).unwrap();
                let actual = run_linear(&compiled.code, &compiled.function, arguments);

                assert_eq!(
                    actual,
                    Ok(expected),
                    "{} on {arguments:?} with {options:?}\n{}",
                    function.symbol_name,
                    strip_ansi_escapes::strip_str(compiled.code.to_string())
                );
            }
        }
    }
}

#[test]
fn entry_label_comes_first_and_only_once() {
    for (source, _) in PROGRAMS {
        let (cfg, function) = parse_function(source).unwrap();

        for options in all_options() {
            let compiled = compile_function(cfg.clone(), function.clone(), &options).unwrap();
            let labels: Vec<_> = compiled.code.labels().collect();

            let Some(Statement::Label(first)) = compiled.code.statements.first() else {
                panic!("code should start with a label");
            };
            assert_eq!(labels.iter().filter(|l| *l == first).count(), 1);
            assert!(!labels.contains(&compiled.function.end_label()));
        }
    }
}

#[test]
fn scratch_registers_are_never_allocated() {
    for (source, _) in PROGRAMS {
        let (cfg, function) = parse_function(source).unwrap();
        let options = CodegenOptions {
            registers: 2,
            ..Default::default()
        };

        let compiled = compile_function(cfg, function, &options).unwrap();

        for location in compiled.function.allocation().values() {
            if let DataLocation::Register(register) = location {
                assert!(!Register::SCRATCH.contains(register));
            }
        }
    }
}

#[test]
fn returns_jump_to_the_end_label() {
    let (cfg, function) = parse_function(PROGRAMS[0].0).unwrap();

    let compiled = compile_function(cfg, function, &CodegenOptions::default()).unwrap();

    let end = compiled.function.end_label();
    let returns = compiled
        .code
        .instructions()
        .filter(|i| matches!(i, Instruction::Jump { target } if *target == end))
        .count();
    assert_eq!(returns, 1);
}
