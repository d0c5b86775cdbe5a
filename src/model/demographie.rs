//! Birth dates, ages and marital status of individuals.

use crate::compute::{ComputationError, Formula, FormulaContext, Value};
use crate::entity::EntityKind::Individu;
use crate::store::{Scalar, ValueType, VariableDefinition};
use chrono::{Datelike, NaiveDate};

/// Code labels of `statut_marital`, starting at code 1.
pub const STATUT_MARITAL: &[&str] = &["marie", "celibataire", "divorce", "veuf"];

/// Age used for members that are absent from a group.
pub const AGE_INCONNU: i64 = -9999;

/// Whole years between `birth` and `at`.
pub fn completed_years(birth: NaiveDate, at: NaiveDate) -> i64 {
    let mut years = (at.year() - birth.year()) as i64;
    if (at.month(), at.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

/// Whole months between `birth` and `at`.
pub fn completed_months(birth: NaiveDate, at: NaiveDate) -> i64 {
    let mut months = (at.year() - birth.year()) as i64 * 12 + at.month() as i64 - birth.month() as i64;
    if at.day() < birth.day() {
        months -= 1;
    }
    months
}

fn from_births(
    ctx: &mut FormulaContext<'_>,
    measure: fn(NaiveDate, NaiveDate) -> i64,
) -> Result<Value, ComputationError> {
    let at = ctx.period().start();
    let births = match ctx.get_if_cached("date_naissance", ctx.period())? {
        Some(holder) => holder,
        None => ctx.calculate("date_naissance", ctx.period())?,
    };
    Ok(Value::from(births.dates()?.iter().map(|&b| measure(b, at)).collect::<Vec<_>>()))
}

// Both ages prefer a birth date supplied as input, then each other's cached
// value, and only then fall back to the (possibly default) birth date. A
// default birth date cached by an earlier request does not count as known.

fn age(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    if ctx.get_input("date_naissance", ctx.period())?.is_none() {
        if let Some(months) = ctx.get_if_cached("age_en_mois", ctx.period())? {
            return Ok(Value::from(months.ints()?.iter().map(|m| m.div_euclid(12)).collect::<Vec<_>>()));
        }
    }
    from_births(ctx, completed_years)
}

fn age_en_mois(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
    if ctx.get_input("date_naissance", ctx.period())?.is_none() {
        if let Some(years) = ctx.get_if_cached("age", ctx.period())? {
            return Ok(Value::from(years.ints()?.iter().map(|y| y * 12).collect::<Vec<_>>()));
        }
    }
    from_births(ctx, completed_months)
}

fn status_is(ctx: &mut FormulaContext<'_>, code: i64) -> Result<Value, ComputationError> {
    let status = ctx.calculate("statut_marital", ctx.period())?;
    Ok(Value::from(status.ints()?.iter().map(|&s| s == code).collect::<Vec<_>>()))
}

fn marie(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> { status_is(ctx, 1) }
fn celibataire(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> { status_is(ctx, 2) }
fn divorce(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> { status_is(ctx, 3) }
fn veuf(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> { status_is(ctx, 4) }

pub fn variables() -> Vec<VariableDefinition> {
    let status = |name: &str, label: &str, formula: Formula| {
        VariableDefinition::computed(name, Individu, ValueType::Bool, formula)
            .label(label)
            .requires(&["statut_marital"])
    };

    vec![
        VariableDefinition::input("date_naissance", Individu, ValueType::Date)
            .label("Date de naissance")
            .permanent(),
        VariableDefinition::computed("age", Individu, ValueType::Int, age)
            .label("Âge (en années)")
            .default_value(Scalar::Int(AGE_INCONNU))
            .requires(&["date_naissance"])
            .probes(&["age_en_mois"]),
        VariableDefinition::computed("age_en_mois", Individu, ValueType::Int, age_en_mois)
            .label("Âge (en mois)")
            .default_value(Scalar::Int(AGE_INCONNU))
            .requires(&["date_naissance"])
            .probes(&["age"]),
        VariableDefinition::input("male", Individu, ValueType::Bool).label("Mâle"),
        VariableDefinition::input("statut_marital", Individu, ValueType::Enum(STATUT_MARITAL))
            .label("Statut marital")
            .default_value(Scalar::Int(2)),
        status("marie", "Marié(e)", marie),
        status("celibataire", "Célibataire", celibataire),
        status("divorce", "Divorcé(e)", divorce),
        status("veuf", "Veuf(ve)", veuf),
        VariableDefinition::input("boursier", Individu, ValueType::Bool).label("Étudiant boursier"),
        VariableDefinition::input("inv", Individu, ValueType::Bool).label("Invalide"),
    ]
}
