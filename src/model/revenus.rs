//! Categorical incomes (revenus catégoriels) of the tax household.

use super::{column, couple_sum, flags, flags_of_role, of_role};
use crate::compute::kernel::{self, Op};
use crate::compute::{ComputationError, Formula, FormulaContext, Value};
use crate::entity::EntityKind::{FoyerFiscal, Individu};
use crate::entity::Role;
use crate::store::{ValueType, VariableDefinition};
use chrono::Datelike;

const CAPITAUX_MOBILIERS: [&str; 9] = [
    "capm_banq",
    "capm_cent",
    "capm_caut",
    "capm_part",
    "capm_oblig",
    "capm_caisse",
    "capm_plfcc",
    "capm_epinv",
    "capm_aut",
];

const INDIVIDUAL_INPUTS: &[(&str, &str)] = &[
    // Salaries and pensions
    ("sali", "Salaires imposables"),
    ("sal_nat", "Avantages en nature"),
    ("pen", "Pensions et rentes viagères"),
    ("pen_nat", "Pensions en nature"),
    // Industrial and commercial profits (business transfer)
    ("bic_ca_revente", "Chiffre d'affaires de revente"),
    ("bic_ca_autre", "Chiffre d'affaires hors revente"),
    ("bic_depenses", "Dépenses"),
    ("bic_pv_cession", "Plus-value de cession"),
    ("bic_part_benef_sp", "Part dans les bénéfices de sociétés de personnes (BIC)"),
    // Non-commercial professions
    ("bnc_reel_res_fiscal", "Résultat fiscal (BNC, régime réel)"),
    ("bnc_forf_rec_brut", "Recettes brutes TTC (BNC, régime forfaitaire)"),
    ("bnc_part_benef_sp", "Part dans les bénéfices de sociétés de personnes (BNC)"),
    // Agriculture and fishing
    ("beap_reel_res_fiscal", "Résultat fiscal (BEAP, régime réel)"),
    ("beap_reliq_benef_fiscal", "Reliquat du bénéfice fiscal (BEAP)"),
    ("beap_monogr", "Bénéfice selon monographie (BEAP)"),
    ("beap_part_benef_sp", "Part dans les bénéfices de sociétés de personnes (BEAP)"),
    // Property income
    ("fon_reel_fisc", "Revenus fonciers (régime réel)"),
    ("fon_sp", "Part dans les revenus fonciers de sociétés de personnes"),
    ("fon_forf_bati_rec", "Recettes des immeubles bâtis"),
    ("fon_forf_bati_rel", "Reliquat des immeubles bâtis"),
    ("fon_forf_bati_fra", "Frais des immeubles bâtis"),
    ("fon_forf_bati_tax", "Taxes des immeubles bâtis"),
    ("fon_forf_nbat_rec", "Recettes des terrains non bâtis"),
    ("fon_forf_nbat_dep", "Dépenses des terrains non bâtis"),
    ("fon_forf_nbat_tax", "Taxes des terrains non bâtis"),
    // Movable capital
    ("capm_banq", "Intérêts bancaires"),
    ("capm_cent", "Intérêts de la caisse d'épargne nationale"),
    ("capm_caut", "Intérêts des cautionnements"),
    ("capm_part", "Revenus des parts sociales"),
    ("capm_oblig", "Intérêts des obligations"),
    ("capm_caisse", "Intérêts des bons de caisse"),
    ("capm_plfcc", "Revenus des placements en fonds communs de créances"),
    ("capm_epinv", "Intérêts des comptes épargne pour l'investissement"),
    ("capm_aut", "Autres revenus de capitaux mobiliers"),
    // Foreign income not taxed at source
    ("etr_sal", "Salaires de source étrangère"),
    ("etr_pen", "Pensions de source étrangère"),
    ("etr_trans", "Pensions transférées de l'étranger"),
    ("etr_aut", "Autres revenus de source étrangère"),
    // Deductible charges
    ("rente", "Rentes payées à titre obligatoire et gratuit"),
    ("prime_ass_vie", "Primes d'assurance-vie"),
];

fn floats(values: Vec<f64>) -> Result<Value, ComputationError> { Ok(Value::from(values)) }

// 1. Industrial and commercial profits

fn bic_ca_global(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let revente = column(ctx, "bic_ca_revente")?;
    let autre = column(ctx, "bic_ca_autre")?;
    floats(kernel::apply(Op::Add, &revente, &autre))
}

fn bic_res_cession(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let ca = column(ctx, "bic_ca_global")?;
    let depenses = column(ctx, "bic_depenses")?;
    floats(kernel::positive_part(&kernel::apply(Op::Sub, &ca, &depenses)))
}

fn bic_benef_fiscal_cession(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let resultat = column(ctx, "bic_res_cession")?;
    let plus_value = column(ctx, "bic_pv_cession")?;
    floats(kernel::apply(Op::Add, &resultat, &plus_value))
}

fn bic_res_net(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let benefice = column(ctx, "bic_benef_fiscal_cession")?;
    let part = column(ctx, "bic_part_benef_sp")?;
    floats(kernel::apply(Op::Add, &benefice, &part))
}

fn bic(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    floats(couple_sum(ctx, "bic_res_net")?)
}

// 2. Non-commercial professions

fn bnc_forf_benef_fiscal(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let part = ctx.scalar("ir.bnc.forf.part_forf")?;
    let recettes = column(ctx, "bnc_forf_rec_brut")?;
    floats(kernel::apply_scalar(Op::Mul, &recettes, part))
}

fn bnc(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let reel = couple_sum(ctx, "bnc_reel_res_fiscal")?;
    let forfait = couple_sum(ctx, "bnc_forf_benef_fiscal")?;
    let societes = couple_sum(ctx, "bnc_part_benef_sp")?;
    floats(kernel::sum(&[&reel, &forfait, &societes]))
}

// 3. Agriculture and fishing

fn beap(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let reel = couple_sum(ctx, "beap_reel_res_fiscal")?;
    let reliquat = couple_sum(ctx, "beap_reliq_benef_fiscal")?;
    let monographie = couple_sum(ctx, "beap_monogr")?;
    let societes = couple_sum(ctx, "beap_part_benef_sp")?;
    floats(kernel::sum(&[&reel, &reliquat, &monographie, &societes]))
}

// 4. Property income

fn fon_forf_bati(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let deduc_frais = ctx.scalar("ir.fon.bati.deduc_frais")?;
    let recettes = of_role(ctx, "fon_forf_bati_rec", Role::Primary)?;
    let reliquat = of_role(ctx, "fon_forf_bati_rel", Role::Primary)?;
    let frais = of_role(ctx, "fon_forf_bati_fra", Role::Primary)?;
    let taxes = of_role(ctx, "fon_forf_bati_tax", Role::Primary)?;

    let net = kernel::apply(Op::Add, &kernel::apply_scalar(Op::Mul, &recettes, 1.0 - deduc_frais), &reliquat);
    let charges = kernel::apply(Op::Add, &frais, &taxes);
    floats(kernel::positive_part(&kernel::apply(Op::Sub, &net, &charges)))
}

fn fon_forf_nbat(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let recettes = of_role(ctx, "fon_forf_nbat_rec", Role::Primary)?;
    let depenses = of_role(ctx, "fon_forf_nbat_dep", Role::Primary)?;
    let taxes = of_role(ctx, "fon_forf_nbat_tax", Role::Primary)?;
    let charges = kernel::apply(Op::Add, &depenses, &taxes);
    floats(kernel::positive_part(&kernel::apply(Op::Sub, &recettes, &charges)))
}

fn rfon(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let reel = of_role(ctx, "fon_reel_fisc", Role::Primary)?;
    let bati = column(ctx, "fon_forf_bati")?;
    let non_bati = column(ctx, "fon_forf_nbat")?;
    let societes = of_role(ctx, "fon_sp", Role::Primary)?;
    floats(kernel::sum(&[&reel, &bati, &non_bati, &societes]))
}

// 5. Salaries, pensions and annuities

fn sal(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let salaires = couple_sum(ctx, "sali")?;
    let nature = couple_sum(ctx, "sal_nat")?;
    floats(kernel::apply(Op::Add, &salaires, &nature))
}

fn smig(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let smig_mensuel = ctx.scalar("cotsoc.gen.smig")?;
    let sal = column(ctx, "sal")?;
    let declared = flags_of_role(ctx, "smig_dec", Role::Primary)?;

    Ok(Value::from(
        sal.iter().zip(declared).map(|(&s, d)| d || s <= 12.0 * smig_mensuel).collect::<Vec<_>>(),
    ))
}

fn sal_net(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let abat_sal = ctx.scalar("ir.tspr.abat_sal")?;
    let deduc_smig = ctx.scalar("ir.tspr.smig")?;
    let sal = column(ctx, "sal")?;
    let au_smig = kernel::indicator(&flags(ctx, "smig")?);

    let apres_abattement = kernel::apply_scalar(Op::Mul, &sal, 1.0 - abat_sal);
    let mut deduction = kernel::apply_scalar(Op::Mul, &au_smig, deduc_smig);
    if ctx.period().start().year() >= 2011 {
        // From 2011 the SMIG deduction also applies to low salaries.
        let smig_ext = ctx.scalar("ir.tspr.smig_ext")?;
        let bas_salaire: Vec<f64> = sal.iter().map(|&s| if s <= smig_ext { deduc_smig } else { 0.0 }).collect();
        deduction = kernel::apply(Op::Max, &deduction, &bas_salaire);
    }
    floats(kernel::positive_part(&kernel::apply(Op::Sub, &apres_abattement, &deduction)))
}

fn pen_net(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let abat_pen = ctx.scalar("ir.tspr.abat_pen")?;
    let pen = of_role(ctx, "pen", Role::Primary)?;
    let nature = of_role(ctx, "pen_nat", Role::Primary)?;
    floats(kernel::apply_scalar(Op::Mul, &kernel::apply(Op::Add, &pen, &nature), 1.0 - abat_pen))
}

fn tspr(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let salaires = column(ctx, "sal_net")?;
    let pensions = column(ctx, "pen_net")?;
    floats(kernel::apply(Op::Add, &salaires, &pensions))
}

// 6. Movable capital

fn rvcm(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let mut total = vec![0.0; ctx.count()];
    for name in CAPITAUX_MOBILIERS {
        total = kernel::apply(Op::Add, &total, &of_role(ctx, name, Role::Primary)?);
    }
    floats(total)
}

// 7. Foreign income

fn retr(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    let abat_sal = ctx.scalar("ir.tspr.abat_sal")?;
    let abat_pen = ctx.scalar("ir.tspr.abat_pen")?;
    let abat_pen_etr = ctx.scalar("ir.tspr.abat_pen_etr")?;

    let sal = kernel::apply_scalar(Op::Mul, &of_role(ctx, "etr_sal", Role::Primary)?, 1.0 - abat_sal);
    let pen = kernel::apply_scalar(Op::Mul, &of_role(ctx, "etr_pen", Role::Primary)?, 1.0 - abat_pen);
    let trans = kernel::apply_scalar(Op::Mul, &of_role(ctx, "etr_trans", Role::Primary)?, 1.0 - abat_pen_etr);
    let autres = of_role(ctx, "etr_aut", Role::Primary)?;
    floats(kernel::sum(&[&sal, &pen, &trans, &autres]))
}

pub fn variables() -> Vec<VariableDefinition> {
    let foyer = |name: &str, label: &str, formula: Formula| {
        VariableDefinition::computed(name, FoyerFiscal, ValueType::Float, formula).label(label)
    };
    let individu = |name: &str, label: &str, formula: Formula| {
        VariableDefinition::computed(name, Individu, ValueType::Float, formula).label(label)
    };

    let mut defs: Vec<VariableDefinition> = INDIVIDUAL_INPUTS
        .iter()
        .map(|&(name, label)| VariableDefinition::input(name, Individu, ValueType::Float).label(label))
        .collect();

    defs.extend([
        VariableDefinition::input("smig_dec", Individu, ValueType::Bool).label("Salarié déclarant percevoir le SMIG"),
        individu("bic_ca_global", "Chiffre d'affaires global (BIC, cession de fonds)", bic_ca_global)
            .requires(&["bic_ca_revente", "bic_ca_autre"]),
        individu("bic_res_cession", "Résultat (BIC, cession de fonds)", bic_res_cession)
            .requires(&["bic_ca_global", "bic_depenses"]),
        individu("bic_benef_fiscal_cession", "Bénéfice fiscal (BIC, cession de fonds)", bic_benef_fiscal_cession)
            .requires(&["bic_res_cession", "bic_pv_cession"]),
        individu("bic_res_net", "Résultat net (BIC)", bic_res_net)
            .requires(&["bic_benef_fiscal_cession", "bic_part_benef_sp"]),
        foyer("bic", "Bénéfices industriels et commerciaux", bic).requires(&["bic_res_net"]),
        individu("bnc_forf_benef_fiscal", "Bénéfice fiscal (BNC, régime forfaitaire)", bnc_forf_benef_fiscal)
            .requires(&["bnc_forf_rec_brut"])
            .parameters(&["ir.bnc.forf.part_forf"]),
        foyer("bnc", "Bénéfices des professions non commerciales", bnc)
            .requires(&["bnc_reel_res_fiscal", "bnc_forf_benef_fiscal", "bnc_part_benef_sp"]),
        foyer("beap", "Bénéfices de l'exploitation agricole et de pêche", beap).requires(&[
            "beap_reel_res_fiscal",
            "beap_reliq_benef_fiscal",
            "beap_monogr",
            "beap_part_benef_sp",
        ]),
        foyer("fon_forf_bati", "Revenus fonciers nets des immeubles bâtis", fon_forf_bati)
            .requires(&["fon_forf_bati_rec", "fon_forf_bati_rel", "fon_forf_bati_fra", "fon_forf_bati_tax"])
            .parameters(&["ir.fon.bati.deduc_frais"]),
        foyer("fon_forf_nbat", "Revenus fonciers nets des terrains non bâtis", fon_forf_nbat)
            .requires(&["fon_forf_nbat_rec", "fon_forf_nbat_dep", "fon_forf_nbat_tax"]),
        foyer("rfon", "Revenus fonciers", rfon)
            .requires(&["fon_reel_fisc", "fon_forf_bati", "fon_forf_nbat", "fon_sp"]),
        foyer("sal", "Salaires y compris salaires en nature", sal).requires(&["sali", "sal_nat"]),
        VariableDefinition::computed("smig", FoyerFiscal, ValueType::Bool, smig)
            .label("Indicatrice de salarié payé au SMIG ou SMAG")
            .requires(&["sal", "smig_dec"])
            .parameters(&["cotsoc.gen.smig"]),
        foyer("sal_net", "Salaires nets", sal_net)
            .requires(&["sal", "smig"])
            .parameters(&["ir.tspr.abat_sal", "ir.tspr.smig"]),
        foyer("pen_net", "Pensions et rentes viagères après abattements", pen_net)
            .requires(&["pen", "pen_nat"])
            .parameters(&["ir.tspr.abat_pen"]),
        foyer("tspr", "Traitements, salaires, pensions et rentes viagères", tspr).requires(&["sal_net", "pen_net"]),
        foyer("rvcm", "Revenus de valeurs mobilières et de capitaux mobiliers", rvcm).requires(&CAPITAUX_MOBILIERS),
        foyer("retr", "Revenus de source étrangère", retr)
            .requires(&["etr_sal", "etr_pen", "etr_trans", "etr_aut"])
            .parameters(&["ir.tspr.abat_sal", "ir.tspr.abat_pen", "ir.tspr.abat_pen_etr"]),
    ]);
    defs
}
