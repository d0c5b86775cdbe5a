use crate::compute::{ComputationError, Simulation};
use crate::compute::HolderKey;
use crate::period::Period;
use crate::store::VariableId;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the declared dependency tree of `name` with the values cached for
/// `period`. Every node is looked up at `period` normalized to its own
/// definition period. Nothing is evaluated: uncached nodes show `[?]`.
pub fn format_trace(sim: &Simulation, name: &str, period: Period) -> Result<String, ComputationError> {
    let target = sim.registry().id_of(name)?;
    let mut tracer = Tracer { sim, period, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "AUDIT TRACE for '{}' at {}:", name, period);
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_node(target, 1, "");
    Ok(tracer.output)
}

struct Tracer<'a> {
    sim: &'a Simulation,
    period: Period,
    visited_at_level: HashMap<VariableId, usize>,
    output: String,
}

impl Tracer<'_> {
    fn trace_node(&mut self, id: VariableId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(id, level);

        let sim = self.sim;
        let registry = sim.registry();
        let def = registry.definition(id);
        let line_header = format!("[L{}] {}{}", level, def.name, self.format_value(id));

        if def.is_input() {
            let _ = writeln!(self.output, "{}{} -> Input", prefix, line_header);
            return;
        }

        let parents = registry.get_parents(id);
        let probes = registry.get_probes(id);
        let args: Vec<&str> = parents.iter().map(|&p| registry.name(p)).collect();
        let _ = writeln!(self.output, "{}{} = f({})", prefix, line_header, args.join(", "));

        let stem = build_child_stem(prefix);
        let total = parents.len() + probes.len();
        for (i, &parent) in parents.iter().enumerate() {
            let connector = if i + 1 == total { "`--" } else { "|--" };
            self.trace_node(parent, level + 1, &format!("{}{}", stem, connector));
        }
        for (i, &probe) in probes.iter().enumerate() {
            let connector = if parents.len() + i + 1 == total { "`--" } else { "|--" };
            let _ = writeln!(
                self.output,
                "{}{} {}{} (probe)",
                stem,
                connector,
                registry.name(probe),
                self.format_value(probe)
            );
        }
    }

    fn format_value(&self, id: VariableId) -> String {
        let def = self.sim.registry().definition(id);
        let key = HolderKey { variable: id, period: self.period.normalize(def.definition_period) };
        match self.sim.ledger().peek(key) {
            Some(holder) => match (holder.value.get(0), holder.len()) {
                (None, _) => "[]".to_string(),
                (Some(first), 1) => format!("[{}]", first),
                (Some(first), _) => format!("[{}, ...]", first),
            },
            None => "[?]".to_string(),
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::kernel::{self, Op};
    use crate::compute::{FormulaContext, Value};
    use crate::entity::{EntityKind, Population};
    use crate::legislation::Legislation;
    use crate::store::{ValueType, VariableDefinition, VariableRegistry};
    use std::sync::Arc;

    fn total(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let a = ctx.calculate("a", ctx.period())?;
        let b = ctx.calculate("b", ctx.period())?;
        let (a, b) = (a.floats()?, b.floats()?);
        Ok(Value::from(kernel::apply(Op::Add, &a, &b)))
    }

    fn b(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let a = ctx.calculate("a", ctx.period())?;
        Ok(a.value)
    }

    fn simulation() -> Simulation {
        let ind = EntityKind::Individu;
        let mut reg = VariableRegistry::builder();
        reg.add(VariableDefinition::input("a", ind, ValueType::Float))
            .add(VariableDefinition::input("hint", ind, ValueType::Float))
            .add(VariableDefinition::computed("b", ind, ValueType::Float, b).requires(&["a"]))
            .add(VariableDefinition::computed("total", ind, ValueType::Float, total).requires(&["a", "b"]).probes(&["hint"]));
        let population = Population::builder(1).build().unwrap();
        let mut sim = Simulation::new(Arc::new(reg.build().unwrap()), Arc::new(Legislation::default()), population);
        sim.set_input("a", Period::year(2011).unwrap(), vec![2.0]).unwrap();
        sim
    }

    #[test]
    fn test_trace_shape() {
        let sim = simulation();
        let year = Period::year(2011).unwrap();
        sim.get("total", year).unwrap();

        let out = format_trace(&sim, "total", year).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "AUDIT TRACE for 'total' at 2011:");
        assert_eq!(lines[2], "[L1] total[4.000] = f(a, b)");
        assert_eq!(lines[3], "|--[L2] a[2.000] -> Input");
        assert_eq!(lines[4], "|--[L2] b[2.000] = f(a)");
        assert_eq!(lines[5], "|  `---> (Ref to L2)");
        assert_eq!(lines[6], "`-- hint[?] (probe)");
    }

    #[test]
    fn test_trace_of_unevaluated_tree() {
        let sim = simulation();
        let out = format_trace(&sim, "b", Period::year(2012).unwrap()).unwrap();
        assert!(out.contains("[L1] b[?] = f(a)"), "{}", out);
        assert!(format_trace(&sim, "ghost", Period::year(2012).unwrap()).is_err());
    }
}
