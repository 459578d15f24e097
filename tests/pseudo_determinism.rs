use proptest::prelude::*;

use shader_forge::Expr;
use shader_forge::ScopeBuilder;
use shader_forge::compiler::ExprRef;

/// One fold step over a float expression; each variant keeps the running
/// value a float scalar so arbitrarily long chains stay well-typed.
#[derive(Clone, Debug)]
enum Step {
    Add(f32),
    Mul(f32),
    Clamp(f32, f32),
    Mix(f32, f32),
    Pow(f32),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (-10.0f32..10.0).prop_map(Step::Add),
        (-10.0f32..10.0).prop_map(Step::Mul),
        (-10.0f32..0.0, 0.0f32..10.0).prop_map(|(lo, hi)| Step::Clamp(lo, hi)),
        (-10.0f32..10.0, 0.0f32..1.0).prop_map(|(b, t)| Step::Mix(b, t)),
        (0.0f32..4.0).prop_map(Step::Pow),
    ]
}

fn build(seed: f32, steps: &[Step]) -> ExprRef {
    let mut acc = Expr::const_float(seed);
    for step in steps {
        acc = match *step {
            Step::Add(v) => Expr::add(acc, Expr::const_float(v)).unwrap(),
            Step::Mul(v) => Expr::mul(acc, Expr::const_float(v)).unwrap(),
            Step::Clamp(lo, hi) => {
                Expr::clamp(acc, Expr::const_float(lo), Expr::const_float(hi)).unwrap()
            }
            Step::Mix(b, t) => {
                Expr::mix(acc, Expr::const_float(b), Expr::const_float(t)).unwrap()
            }
            Step::Pow(e) => Expr::pow(acc, Expr::const_float(e)).unwrap(),
        };
    }
    acc
}

proptest! {
    /// Building the identical graph twice yields identical pseudo-code and
    /// identical dependency sets.
    #[test]
    fn pseudo_code_is_deterministic(
        seed in -10.0f32..10.0,
        steps in prop::collection::vec(arb_step(), 0..32),
    ) {
        let first = build(seed, &steps);
        let second = build(seed, &steps);
        prop_assert_eq!(first.to_pseudo_code(), second.to_pseudo_code());
        prop_assert_eq!(
            first.collect_state_dependencies(),
            second.collect_state_dependencies()
        );
    }

    /// An expression folding reads taken at several write generations depends
    /// on exactly the distinct (variable, generation) pairs it read.
    #[test]
    fn dependencies_are_the_union_of_all_reads(write_count in 1usize..8) {
        let mut scope = ScopeBuilder::new("stage");
        let acc = scope.declare_var("acc", Expr::const_float(0.0)).unwrap();

        let mut reads = Vec::new();
        for _ in 0..write_count {
            reads.push(scope.read(&acc).unwrap());
            let next = Expr::add(scope.read(&acc).unwrap(), Expr::const_float(1.0)).unwrap();
            scope.assign(&acc, next).unwrap();
        }
        reads.push(scope.read(&acc).unwrap());

        let mut combined = reads[0].clone();
        for read in &reads[1..] {
            combined = Expr::add(combined, read.clone()).unwrap();
        }

        let deps = combined.collect_state_dependencies();
        prop_assert_eq!(deps.len(), write_count + 1);
        for (generation, dep) in deps.iter().enumerate() {
            prop_assert_eq!(dep.var.as_str(), "acc");
            prop_assert_eq!(dep.generation, generation as u64);
        }
    }
}
