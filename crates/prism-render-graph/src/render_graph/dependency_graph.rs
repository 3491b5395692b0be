//! renderer 之间的依赖图与拓扑排序
//!
//! 使用 petgraph 的 DiGraph，边从 predecessor 指向依赖它的 renderer。

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use slotmap::SecondaryMap;

use crate::render_graph::RendererHandle;

pub struct DependencyGraph {
    /// 节点存储 renderer 句柄，边没有数据
    graph: DiGraph<RendererHandle, ()>,
    node_indices: SecondaryMap<RendererHandle, NodeIndex>,
}

impl DependencyGraph {
    /// # 参数
    /// - `nodes`: (renderer, 它的 predecessors)，按添加顺序
    ///
    /// predecessor 必须也出现在 `nodes` 中，否则忽略这条边
    pub fn build<'a>(nodes: impl IntoIterator<Item = (RendererHandle, &'a [RendererHandle])> + Clone) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = SecondaryMap::new();
        for (handle, _) in nodes.clone() {
            node_indices.insert(handle, graph.add_node(handle));
        }

        for (handle, predecessors) in nodes {
            let consumer = node_indices[handle];
            for predecessor in predecessors {
                let Some(&producer) = node_indices.get(*predecessor) else {
                    log::warn!("predecessor {:?} of {:?} is not in the graph", predecessor, handle);
                    continue;
                };
                if graph.find_edge(producer, consumer).is_none() {
                    graph.add_edge(producer, consumer, ());
                }
            }
        }

        Self { graph, node_indices }
    }

    /// 执行拓扑排序
    ///
    /// # 返回
    /// - `Ok(order)`: 排序后的 renderer 列表，predecessor 总在前面
    /// - `Err(node)`: 检测到循环依赖，返回循环中的一个 renderer
    pub fn topological_sort(&self) -> Result<Vec<RendererHandle>, RendererHandle> {
        match toposort(&self.graph, None) {
            Ok(sorted_nodes) => Ok(sorted_nodes.into_iter().map(|n| self.graph[n]).collect()),
            Err(cycle) => Err(self.graph[cycle.node_id()]),
        }
    }

    /// 直接依赖
    #[cfg(test)]
    fn get_predecessors(&self, handle: RendererHandle) -> Vec<RendererHandle> {
        let node = self.node_indices[handle];
        self.graph.neighbors_directed(node, petgraph::Direction::Incoming).map(|n| self.graph[n]).collect()
    }

    /// 所有直接或间接依赖，按 `order` 中的顺序排列，不包括自身
    pub fn ancestors(&self, handle: RendererHandle, order: &[RendererHandle]) -> Vec<RendererHandle> {
        let start = self.node_indices[handle];
        let reversed = Reversed(&self.graph);

        let mut reachable = SecondaryMap::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(node) = dfs.next(reversed) {
            if node != start {
                reachable.insert(self.graph[node], ());
            }
        }

        order.iter().copied().filter(|h| reachable.contains_key(*h)).collect()
    }
}
