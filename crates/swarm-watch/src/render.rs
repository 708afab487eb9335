use swarm_channel::ChannelState;
use swarm_core::AgentRecord;

/// Plain-text status panel for one state value.
pub fn render_state(state: &ChannelState) -> String {
    let project = state
        .project_id
        .as_ref()
        .map(|id| id.as_str())
        .unwrap_or("-");
    let busy = state
        .agents
        .iter()
        .filter(|agent| agent.status.is_busy())
        .count();
    let mut out = format!(
        "[{}] project={} stage={} health={} agents={} busy={}",
        state.connection,
        project,
        state.stage,
        state.health(),
        state.agents.len(),
        busy
    );
    if !state.last_message.is_empty() {
        out.push_str("\n  last: ");
        out.push_str(&state.last_message);
    }
    let id_width = state
        .agents
        .iter()
        .map(|agent| agent.id.len())
        .max()
        .unwrap_or(0);
    for agent in &state.agents {
        out.push('\n');
        out.push_str(&render_agent(agent, id_width));
    }
    out
}

fn render_agent(agent: &AgentRecord, id_width: usize) -> String {
    let mut line = format!(
        "  {:<id_width$}  {:<20}  {:<10}",
        agent.id,
        agent.kind.as_str(),
        agent.status.as_str(),
    );
    if let Some(task) = agent.current_task.as_deref() {
        line.push_str("  ");
        line.push_str(task);
    }
    if let Some(progress) = agent.progress {
        line.push_str(&format!(" ({progress:.0}%)"));
    }
    line.trim_end().to_string()
}
