use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::analysis::decompose::{Subnet, decompose};
use crate::analysis::graph::NetGraph;
use crate::analysis::notation::{
    Matrix, effect_matrix, formal_notation, input_matrix, output_matrix,
};
use crate::net::core::{DiagnosticReport, Net};
use crate::net::structure::{NetMode, Weight};

#[derive(Debug, Clone, Serialize)]
pub struct SubnetReport {
    pub index: usize,
    pub notation: String,
    pub input: Matrix<Weight>,
    pub output: Matrix<Weight>,
    /// `C = O − I`
    pub effect: Matrix<i64>,
}

impl SubnetReport {
    pub fn new(net: &Net, index: usize, subnet: &Subnet) -> Self {
        let input = input_matrix(net, subnet);
        let output = output_matrix(net, subnet);
        let effect = effect_matrix(&input, &output);
        Self {
            index,
            notation: formal_notation(net, subnet),
            input,
            output,
            effect,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub mode: NetMode,
    pub subnets: Vec<SubnetReport>,
    pub diagnostics: DiagnosticReport,
    pub analysis_time: Duration,
}

impl AnalysisReport {
    /// Decomposes the net and renders every subnet in parallel.
    pub fn build(net: &Net) -> Self {
        let start = Instant::now();
        let subnets = decompose(net);
        let mut diagnostics = net.diagnose_connectivity();

        let components = NetGraph::new(net).component_count();
        if !net.is_empty() && components != subnets.len() {
            diagnostics.warnings.push(format!(
                "decomposition found {} subnets but the graph has {components} components",
                subnets.len()
            ));
        }

        let subnets = subnets
            .par_iter()
            .enumerate()
            .map(|(index, subnet)| SubnetReport::new(net, index, subnet))
            .collect::<Vec<_>>();
        log::debug!("analysed {} subnets", subnets.len());

        Self {
            mode: net.mode(),
            subnets,
            diagnostics,
            analysis_time: start.elapsed(),
        }
    }

    /// 将报告以 JSON 保存到文件中
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "网分析报告")?;
        writeln!(f, "模型: {:?}", self.mode)?;
        writeln!(f, "子网数量: {}", self.subnets.len())?;
        for subnet in &self.subnets {
            writeln!(f, "\n子网 #{}", subnet.index + 1)?;
            writeln!(f, "{}", subnet.notation)?;
            writeln!(f, "\n{}", subnet.input)?;
            write!(f, "{}", subnet.output)?;
        }
        if self.diagnostics.has_issues() {
            writeln!(f, "\n诊断:")?;
            write!(f, "{}", self.diagnostics)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Initializer, Place, Transition};

    fn net() -> Net {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::with_tokens("p0", 1)).unwrap();
        let p1 = net.add_place(Place::new("p1")).unwrap();
        let t0 = net.add_transition(Transition::new("t0")).unwrap();
        net.add_arc(p0, t0, 1).unwrap();
        net.add_arc(t0, p1, 1).unwrap();
        net.add_place(Place::new("spare")).unwrap();
        net
    }

    #[test]
    fn one_report_per_subnet_in_order() {
        let report = AnalysisReport::build(&net());
        assert_eq!(report.subnets.len(), 2);
        assert_eq!(report.subnets[0].index, 0);
        assert!(report.subnets[0].notation.starts_with("PN = {P, T, I, O, M₀}"));
        assert_eq!(report.diagnostics.isolated_places, vec!["spare".to_string()]);
        assert!(report.diagnostics.warnings.is_empty());
        assert!(report.to_string().contains("子网 #2"));
    }

    #[test]
    fn report_serializes_to_json() {
        let report = AnalysisReport::build(&net());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["mode"], "Standard");
        assert_eq!(value["subnets"][0]["input"]["label"], "I");
        assert_eq!(value["subnets"][0]["effect"]["places"][1], "p1");
    }

    #[test]
    fn unwired_initializer_keeps_counts_consistent() {
        let mut net = net();
        net.add_initializer(Initializer::new("unwired", 1, 1.0)).unwrap();
        let report = AnalysisReport::build(&net);
        assert_eq!(report.subnets.len(), 3);
        assert!(!report.diagnostics.warnings.iter().any(|w| w.contains("components")));
    }
}
