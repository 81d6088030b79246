// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synthetic `.nessus` documents for tests.

/// One `ReportItem` in a synthetic report.
#[derive(Debug, Clone)]
pub struct SampleItem {
    pub plugin_id: u64,
    pub plugin_name: String,
    pub plugin_family: String,
    pub severity: u8,
    pub port: u16,
    pub protocol: String,
    pub service: String,
    pub cve: Vec<String>,
    pub cvss_score: Option<f64>,
    pub exploit_available: bool,
    pub description: String,
    pub solution: String,
    pub plugin_output: Option<String>,
}

/// A plausible default item; tweak fields as the test needs.
pub fn item(plugin_id: u64, severity: u8) -> SampleItem {
    SampleItem {
        plugin_id,
        plugin_name: format!("Plugin {plugin_id}"),
        plugin_family: "General".to_string(),
        severity,
        port: 443,
        protocol: "tcp".to_string(),
        service: "www".to_string(),
        cve: Vec::new(),
        cvss_score: None,
        exploit_available: false,
        description: "A vulnerability was detected.".to_string(),
        solution: "Apply the vendor patch.".to_string(),
        plugin_output: None,
    }
}

/// The scan-info plugin with a credentialed-checks verdict line.
pub fn scan_info_item(credentialed: &str) -> SampleItem {
    let mut info = item(19506, 0);
    info.plugin_name = "Nessus Scan Information".to_string();
    info.plugin_family = "Settings".to_string();
    info.port = 0;
    info.plugin_output = Some(format!(
        "Information about this scan :\n\nNessus version : 10.7.2\nScanner IP : 10.0.0.2\nPort scanner(s) : nessus_syn_scanner\nCredentialed checks : {credentialed}\nScan duration : 1042 sec\n"
    ));
    info
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a complete `.nessus` document.
///
/// The policy boilerplate keeps even a one-item report above the
/// validator's structural size floor, matching real exports.
pub fn render(scan_name: &str, hosts: &[(&str, Vec<SampleItem>)]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" ?>\n<NessusClientData_v2>\n");
    xml.push_str("<Policy><policyName>Scan Policy</policyName>\n<Preferences><ServerPreferences>\n");
    xml.push_str("<preference><name>plugin_set</name><value>202501010000</value></preference>\n");
    xml.push_str("<preference><name>scan_start_timestamp</name><value>1735689600</value></preference>\n");
    xml.push_str("<preference><name>whoami</name><value>scanwarden</value></preference>\n");
    xml.push_str("<preference><name>sc_version</name><value>unknown</value></preference>\n");
    xml.push_str("<preference><name>report_task_id</name><value>00000000-0000-0000-0000-000000000000</value></preference>\n");
    xml.push_str("<preference><name>max_hosts</name><value>30</value></preference>\n");
    xml.push_str("<preference><name>max_checks</name><value>5</value></preference>\n");
    xml.push_str("</ServerPreferences></Preferences></Policy>\n");
    xml.push_str(&format!("<Report name=\"{}\">\n", escape(scan_name)));
    for (host, items) in hosts {
        xml.push_str(&format!("<ReportHost name=\"{}\">\n", escape(host)));
        xml.push_str("<HostProperties><tag name=\"host-ip\">10.0.0.1</tag></HostProperties>\n");
        for item in items {
            xml.push_str(&format!(
                "<ReportItem port=\"{}\" svc_name=\"{}\" protocol=\"{}\" severity=\"{}\" pluginID=\"{}\" pluginName=\"{}\" pluginFamily=\"{}\">\n",
                item.port,
                escape(&item.service),
                escape(&item.protocol),
                item.severity,
                item.plugin_id,
                escape(&item.plugin_name),
                escape(&item.plugin_family),
            ));
            xml.push_str(&format!(
                "<description>{}</description>\n",
                escape(&item.description)
            ));
            xml.push_str(&format!("<solution>{}</solution>\n", escape(&item.solution)));
            xml.push_str(&format!(
                "<risk_factor>{}</risk_factor>\n",
                risk_factor(item.severity)
            ));
            for cve in &item.cve {
                xml.push_str(&format!("<cve>{}</cve>\n", escape(cve)));
            }
            if let Some(score) = item.cvss_score {
                xml.push_str(&format!("<cvss3_base_score>{score}</cvss3_base_score>\n"));
            }
            if item.exploit_available {
                xml.push_str("<exploit_available>true</exploit_available>\n");
            }
            if let Some(output) = &item.plugin_output {
                xml.push_str(&format!(
                    "<plugin_output>{}</plugin_output>\n",
                    escape(output)
                ));
            }
            xml.push_str("</ReportItem>\n");
        }
        xml.push_str("</ReportHost>\n");
    }
    xml.push_str("</Report>\n</NessusClientData_v2>\n");
    xml
}

fn risk_factor(severity: u8) -> &'static str {
    match severity {
        4 => "Critical",
        3 => "High",
        2 => "Medium",
        1 => "Low",
        _ => "None",
    }
}
