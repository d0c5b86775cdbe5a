//! Household composition, deductions and the income tax itself.

use super::{as_ints, column, flags_of_role, of_role};
use crate::compute::kernel::{self, Op};
use crate::compute::{ComputationError, Formula, FormulaContext, Value};
use crate::entity::EntityKind::FoyerFiscal;
use crate::entity::Role;
use crate::store::{ValueType, VariableDefinition};

fn floats(values: Vec<f64>) -> Result<Value, ComputationError> { Ok(Value::from(values)) }

fn zeros(ctx: &FormulaContext<'_>) -> Result<Value, ComputationError> { floats(vec![0.0; ctx.count()]) }

// Household composition

fn nb_enf(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let age_limite = ctx.scalar("ir.deduc.fam.age")?;
    let ages = ctx.calculate("age", ctx.period())?;

    let mut count = vec![0.0; ctx.count()];
    for (_, value) in ctx.split_by_roles(&ages, &Role::DEPENDENTS)? {
        // Absent dependents carry a negative age and are never counted.
        for (n, age) in count.iter_mut().zip(as_ints("age", &value)?) {
            if age >= 0 && (age as f64) < age_limite {
                *n += 1.0;
            }
        }
    }
    floats(count)
}

fn nb_enf_sup(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    ctx.calculate("age_en_mois", ctx.period())?;
    ctx.calculate("boursier", ctx.period())?;
    zeros(ctx)
}

fn nb_infirme(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    ctx.calculate("age_en_mois", ctx.period())?;
    ctx.calculate("inv", ctx.period())?;
    zeros(ctx)
}

fn nb_par(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let months = ctx.calculate("age_en_mois", ctx.period())?;
    let mut count = vec![0.0; ctx.count()];
    for role in Role::COUPLE {
        let value = ctx.filter_role(&months, role)?;
        for (n, m) in count.iter_mut().zip(as_ints("age_en_mois", &value)?) {
            if m > 10 * 12 {
                *n += 1.0;
            }
        }
    }
    floats(count)
}

// Income and deductions

fn rng(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let tspr = column(ctx, "tspr")?;
    let rfon = column(ctx, "rfon")?;
    let rvcm = column(ctx, "rvcm")?;
    let retr = column(ctx, "retr")?;
    floats(kernel::sum(&[&tspr, &rfon, &rvcm, &retr]))
}

fn deduc_fam(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let chef = ctx.scalar("ir.deduc.fam.chef")?;
    let by_rank = [
        ctx.scalar("ir.deduc.fam.enf1")?,
        ctx.scalar("ir.deduc.fam.enf2")?,
        ctx.scalar("ir.deduc.fam.enf3")?,
        ctx.scalar("ir.deduc.fam.enf4")?,
    ];
    let nb_enf = column(ctx, "nb_enf")?;

    let deduction = nb_enf
        .iter()
        .map(|&n| {
            let head = if n > 0.0 { chef } else { 0.0 };
            let children: f64 = by_rank.iter().enumerate().filter(|(rank, _)| n >= (rank + 1) as f64).map(|(_, d)| d).sum();
            head + children
        })
        .collect();
    floats(deduction)
}

fn deduc_rente(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    floats(of_role(ctx, "rente", Role::Primary)?)
}

fn ass_vie(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let plaf = ctx.scalar("ir.deduc.ass_vie.plaf")?;
    let conj_plaf = ctx.scalar("ir.deduc.ass_vie.conj_plaf")?;
    let enf_plaf = ctx.scalar("ir.deduc.ass_vie.enf_plaf")?;

    let primes = ctx.calculate("prime_ass_vie", ctx.period())?;
    let primes = ctx.sum_by_entity(&primes)?;
    let marie = kernel::indicator(&flags_of_role(ctx, "marie", Role::Primary)?);
    let nb_enf = column(ctx, "nb_enf")?;

    let plafond = kernel::apply(
        Op::Add,
        &kernel::apply_scalar(Op::Mul, &marie, conj_plaf),
        &kernel::apply_scalar(Op::Mul, &nb_enf, enf_plaf),
    );
    floats(kernel::apply(Op::Min, &primes, &kernel::apply_scalar(Op::Add, &plafond, plaf)))
}

fn deduc_smig(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    ctx.calculate("chef", ctx.period())?;
    zeros(ctx)
}

fn rni(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let rng = column(ctx, "rng")?;
    let deductions = kernel::sum(&[&column(ctx, "deduc_fam")?, &column(ctx, "deduc_rente")?, &column(ctx, "ass_vie")?]);
    floats(kernel::apply(Op::Sub, &rng, &deductions))
}

// Tax

fn ir_brut(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let legislation = ctx.legislation();
    let bareme = legislation.bareme("ir.bareme")?;
    // The exemption reform is absent from most years of the legislation.
    let exemption_active = legislation.scalar_or("ir.reforme.exemption.active", 0.0)? == 1.0;
    let exemption_max = legislation.scalar_or("ir.reforme.exemption.max", 0.0)?;

    let mut rni = column(ctx, "rni")?;
    if exemption_active {
        for r in rni.iter_mut().filter(|r| **r <= exemption_max) {
            *r = 0.0;
        }
    }
    floats(bareme.calc(&rni))
}

fn irpp(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    floats(column(ctx, "ir_brut")?)
}

pub fn variables() -> Vec<VariableDefinition> {
    let foyer = |name: &str, label: &str, formula: Formula| {
        VariableDefinition::computed(name, FoyerFiscal, ValueType::Float, formula).label(label)
    };

    vec![
        VariableDefinition::input("chef", FoyerFiscal, ValueType::Bool).label("Chef de famille"),
        foyer("nb_enf", "Nombre d'enfants à charge", nb_enf)
            .requires(&["age"])
            .parameters(&["ir.deduc.fam.age"]),
        foyer("nb_enf_sup", "Nombre d'enfants étudiants du supérieur non boursiers", nb_enf_sup)
            .requires(&["age_en_mois", "boursier"]),
        foyer("nb_infirme", "Nombre d'enfants infirmes", nb_infirme).requires(&["age_en_mois", "inv"]),
        foyer("nb_par", "Nombre de parents", nb_par).requires(&["age_en_mois"]),
        foyer("rng", "Revenu net global", rng).requires(&["tspr", "rfon", "rvcm", "retr"]),
        foyer("deduc_fam", "Déductions pour situation et charges de famille", deduc_fam)
            .requires(&["nb_enf"])
            .parameters(&[
                "ir.deduc.fam.chef",
                "ir.deduc.fam.enf1",
                "ir.deduc.fam.enf2",
                "ir.deduc.fam.enf3",
                "ir.deduc.fam.enf4",
            ]),
        foyer("deduc_rente", "Arrérages et rentes payées à titre obligatoire et gratuit", deduc_rente)
            .requires(&["rente"]),
        foyer("ass_vie", "Primes afférentes aux contrats d'assurance-vie", ass_vie)
            .requires(&["prime_ass_vie", "marie", "nb_enf"])
            .parameters(&["ir.deduc.ass_vie.plaf", "ir.deduc.ass_vie.conj_plaf", "ir.deduc.ass_vie.enf_plaf"]),
        foyer("deduc_smig", "Déduction supplémentaire pour les salariés payés au SMIG et SMAG", deduc_smig)
            .requires(&["chef"]),
        foyer("rni", "Revenu net imposable", rni).requires(&["rng", "deduc_fam", "deduc_rente", "ass_vie"]),
        foyer("ir_brut", "Impôt avant non-imposabilité", ir_brut)
            .requires(&["rni"])
            .parameters(&["ir.bareme"]),
        foyer("irpp", "Impôt sur le revenu des personnes physiques", irpp).requires(&["ir_brut"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Simulation;
    use crate::entity::Population;
    use crate::legislation::Legislation;
    use crate::model::{build_registry, reference_legislation, TaxBenefitSystem};
    use crate::period::Period;
    use rstest::rstest;
    use std::sync::Arc;

    fn year() -> Period { Period::year(2012).unwrap() }

    // Foyer 0: declarant aged 30 with two dependents. Foyer 1: a lone declarant.
    fn family() -> Population {
        Population::builder(4)
            .group(FoyerFiscal, [(0, Role::Primary), (0, Role::Dependent1), (0, Role::Dependent2), (1, Role::Primary)])
            .build()
            .unwrap()
    }

    fn simulation(legislation: Legislation, population: Population) -> Simulation {
        Simulation::new(Arc::new(build_registry().unwrap()), Arc::new(legislation), population)
    }

    fn floats_of(sim: &Simulation, name: &str) -> Vec<f64> {
        sim.get(name, year()).unwrap().floats().unwrap().into_owned()
    }

    #[test]
    fn test_nb_enf_counts_dependents_under_age_limit() {
        let legislation = Legislation::from_json_str(
            r#"{ "ir": { "deduc": { "fam": { "age": { "values": [ { "start": "2000-01-01", "value": 18 } ] } } } } }"#,
        )
        .unwrap();
        let mut sim = simulation(legislation, family());
        sim.set_input("age", year(), vec![30_i64, 10, 16, 45]).unwrap();
        assert_eq!(floats_of(&sim, "nb_enf"), vec![2.0, 0.0]);
    }

    #[test]
    fn test_nb_par_with_missing_spouse() {
        let mut sim = simulation(reference_legislation().unwrap(), family());
        sim.set_input("age_en_mois", year(), vec![360_i64, 120, 192, 540]).unwrap();
        // No spouse in either foyer: the missing member contributes nothing.
        assert_eq!(floats_of(&sim, "nb_par"), vec![1.0, 1.0]);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(1.0, 150.0 + 90.0)]
    #[case(3.0, 150.0 + 90.0 + 75.0 + 60.0)]
    #[case(6.0, 150.0 + 90.0 + 75.0 + 60.0 + 45.0)]
    fn test_deduc_fam_steps(#[case] nb_enf: f64, #[case] expected: f64) {
        let population = Population::builder(1).build().unwrap();
        let mut sim = simulation(reference_legislation().unwrap(), population);
        sim.set_input("nb_enf", year(), vec![nb_enf]).unwrap();
        assert_eq!(floats_of(&sim, "deduc_fam"), vec![expected]);
    }

    #[test]
    fn test_ir_brut_is_zero_at_zero_and_non_decreasing() {
        let incomes: Vec<f64> = (0..200).map(|i| i as f64 * 500.0).collect();
        let population = Population::builder(incomes.len()).build().unwrap();
        let mut sim = simulation(reference_legislation().unwrap(), population);
        sim.set_input("rni", year(), incomes).unwrap();

        let tax = floats_of(&sim, "ir_brut");
        assert_eq!(tax[0], 0.0);
        assert!(tax.windows(2).all(|w| w[0] <= w[1]));
        assert!(tax.iter().all(|&t| t >= 0.0));
    }

    #[test]
    fn test_exemption_reform_zeroes_small_incomes() {
        let population = Population::builder(2).build().unwrap();
        let mut sim = simulation(reference_legislation().unwrap(), population);
        let reform_year = Period::year(2018).unwrap();
        sim.set_input("rni", reform_year, vec![4_000.0, 40_000.0]).unwrap();
        sim.set_input("rni", year(), vec![4_000.0, 40_000.0]).unwrap();

        let before = sim.get("ir_brut", year()).unwrap().floats().unwrap().into_owned();
        let after = sim.get("ir_brut", reform_year).unwrap().floats().unwrap().into_owned();
        assert!(before[0] > 0.0);
        assert_eq!(after[0], 0.0);
        assert_eq!(after[1], before[1]);
    }

    #[test]
    fn test_irpp_end_to_end() {
        let system = TaxBenefitSystem::new().unwrap();
        let population = Population::builder(3)
            .group(FoyerFiscal, [(0, Role::Primary), (0, Role::Spouse), (0, Role::Dependent1)])
            .build()
            .unwrap();
        let mut sim = system.new_simulation(population).unwrap();
        sim.set_input("sali", year(), vec![24_000.0, 12_000.0, 0.0]).unwrap();
        sim.set_input("statut_marital", year(), vec![1_i64, 1, 2]).unwrap();
        sim.set_input("age", year(), vec![40_i64, 38, 8]).unwrap();

        let irpp = floats_of(&sim, "irpp");
        let rni = floats_of(&sim, "rni");
        let bareme = sim.legislation_at(year().start()).bareme("ir.bareme").unwrap().clone();
        assert_eq!(irpp, bareme.calc(&rni));
        assert!(irpp[0] > 0.0);
        assert_eq!(floats_of(&sim, "nb_enf"), vec![1.0]);

        // A second request is served from the cache.
        let evaluations = sim.evaluations("irpp").unwrap();
        sim.get("irpp", year()).unwrap();
        assert_eq!(sim.evaluations("irpp").unwrap(), evaluations);
    }
}
