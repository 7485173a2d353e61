use std::collections::BTreeMap;
use std::fmt::{Display, Error, Formatter};
use std::ops::{Index, IndexMut};
use std::time::Duration;

use format_num::NumberFormat;

use crate::backtrack::DecLvl;
use crate::core::{IntCst, Lit};
use crate::reasoners::{ReasonerId, REASONERS};

/// Counters of the search, global and per reasoning module.
#[derive(Clone)]
pub struct Stats {
    /// Time spent posting constraints and initializing the reasoners.
    pub init_time: Duration,
    pub solve_time: Duration,
    pub num_decisions: u64,
    pub num_conflicts: u64,
    pub num_restarts: u64,
    pub num_solutions: u64,
    pub num_dom_updates: u64,
    pub per_module_stat: BTreeMap<ReasonerId, ModuleStat>,
    best_cost: Option<IntCst>,
}

#[derive(Clone, Default)]
pub struct ModuleStat {
    pub conflicts: u64,
    pub propagation_loops: u64,
    pub dom_updates: u64,
}

impl Stats {
    pub fn new() -> Stats {
        let mut per_module = BTreeMap::new();
        for id in &REASONERS {
            let _ = per_module.insert(*id, ModuleStat::default());
        }
        Stats {
            init_time: Duration::ZERO,
            solve_time: Duration::ZERO,
            num_decisions: 0,
            num_conflicts: 0,
            num_restarts: 0,
            num_solutions: 0,
            num_dom_updates: 0,
            per_module_stat: per_module,
            best_cost: None,
        }
    }

    pub fn add_decision(&mut self, _decision: Lit) {
        self.num_decisions += 1;
    }

    pub fn add_conflict(&mut self, _depth: DecLvl, _size: usize) {
        self.num_conflicts += 1;
    }

    pub fn add_solution(&mut self, cost: IntCst) {
        self.num_solutions += 1;
        self.best_cost = Some(cost);
    }

    pub fn add_restart(&mut self) {
        self.num_restarts += 1;
    }

    pub fn num_conflicts(&self) -> u64 {
        self.num_conflicts
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        fn label(f: &mut Formatter<'_>, label: &str) -> Result<(), Error> {
            write!(f, "{label:<20}: ")
        }
        let num = NumberFormat::new();
        let throughput = |value: u64| {
            if self.solve_time.is_zero() {
                "-".to_string()
            } else {
                num.format(".3s", value as f64 / self.solve_time.as_secs_f64())
            }
        };

        label(f, "solutions")?;
        writeln!(f, "{:<12}", self.num_solutions)?;
        label(f, "restarts")?;
        writeln!(f, "{:<12}", self.num_restarts)?;
        label(f, "decisions")?;
        writeln!(f, "{:<12} ({}/sec)", self.num_decisions, throughput(self.num_decisions))?;
        label(f, "conflicts")?;
        writeln!(f, "{:<12} ({}/sec)", self.num_conflicts, throughput(self.num_conflicts))?;
        label(f, "domain updates")?;
        writeln!(f, "{:<12}", self.num_dom_updates)?;

        writeln!(f, "================= ")?;
        label(f, "Reasoners")?;
        for i in self.per_module_stat.keys() {
            write!(f, "{:>15}", format!("{i}"))?;
        }
        writeln!(f)?;
        label(f, "# propagation loops")?;
        for ms in self.per_module_stat.values() {
            write!(f, "{:>15}", ms.propagation_loops)?;
        }
        writeln!(f)?;
        label(f, "# conflicts")?;
        for ms in self.per_module_stat.values() {
            write!(f, "{:>15}", ms.conflicts)?;
        }
        writeln!(f)?;

        writeln!(f, "================= ")?;
        label(f, "Init time")?;
        writeln!(f, "{:.6} s", self.init_time.as_secs_f64())?;
        label(f, "Solve time")?;
        writeln!(f, "{:.6} s", self.solve_time.as_secs_f64())?;
        Ok(())
    }
}

impl Index<ReasonerId> for Stats {
    type Output = ModuleStat;

    fn index(&self, index: ReasonerId) -> &Self::Output {
        &self.per_module_stat[&index]
    }
}

impl IndexMut<ReasonerId> for Stats {
    fn index_mut(&mut self, index: ReasonerId) -> &mut Self::Output {
        self.per_module_stat.get_mut(&index).unwrap()
    }
}
